//! Command-line interface for AuthRelay
//!
//! `relay serve` runs the relay. The remaining commands play the mobile
//! shell's part against a running relay, keeping the session in a
//! file-backed store under the configured session directory.

use crate::claims::{assess_freshness, decode, normalize};
use crate::client::{AuthClient, RelayClient};
use crate::config::Config;
use crate::session::{FileStore, SessionStatus};
use crate::{RelayError, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::{Value, json};
use std::sync::Arc;

/// Main CLI entry point
pub async fn run() -> Result<()> {
    let matches = build_cli().get_matches();
    dispatch(&matches).await
}

async fn dispatch(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("serve", sub)) => handle_serve_command(sub).await,
        Some(("inspect", sub)) => handle_inspect_command(sub),
        Some(("login-url", sub)) => {
            let client = auth_client()?;
            let start = client
                .sign_in_url(sub.get_one::<String>("organization").map(String::as_str))
                .await?;
            println!("{}", start.authorization_url);
            eprintln!("state: {}", start.state);
            Ok(())
        }
        Some(("exchange", sub)) => {
            let code = required(sub, "code")?;
            let record = auth_client()?.complete_sign_in(code).await?;
            println!("Signed in as {}", record.user.display_name());
            print_json(&json!({
                "user": record.user,
                "session": record.session,
            }))
        }
        Some(("session", sub)) => handle_session_command(sub).await,
        Some(("orgs", _)) => {
            let organizations = auth_client()?.organizations().await;
            print_json(&organizations)
        }
        Some(("switch-org", sub)) => {
            let organization_id = required(sub, "organization-id")?;
            let record = auth_client()?
                .switch_organization(organization_id)
                .await?;
            println!(
                "Switched to organization {}",
                record
                    .session
                    .organization_id
                    .as_deref()
                    .unwrap_or(organization_id)
            );
            Ok(())
        }
        Some(("signout", _)) => {
            match auth_client()?.sign_out().await? {
                Some(logout_url) => {
                    println!("Signed out. Visit to end the provider session:");
                    println!("{}", logout_url);
                }
                None => println!("Signed out"),
            }
            Ok(())
        }
        _ => {
            eprintln!("No command specified. Use --help for usage information.");
            std::process::exit(1);
        }
    }
}

/// Build the `relay` command tree
pub fn build_cli() -> Command {
    Command::new("relay")
        .about("AuthRelay - identity provider token relay")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand(
            Command::new("serve")
                .about("Start the relay server")
                .arg(Arg::new("host").long("host").help("Bind host"))
                .arg(
                    Arg::new("port")
                        .long("port")
                        .short('p')
                        .value_parser(clap::value_parser!(u16))
                        .help("Bind port"),
                ),
        )
        .subcommand(
            Command::new("inspect")
                .about("Decode an access token without verifying it")
                .arg(Arg::new("token").required(true).index(1))
                .arg(
                    Arg::new("lead-time")
                        .long("lead-time")
                        .value_parser(clap::value_parser!(i64))
                        .help("Refresh lead time in seconds"),
                ),
        )
        .subcommand(
            Command::new("login-url")
                .about("Print the hosted sign-in URL")
                .arg(
                    Arg::new("organization")
                        .long("organization")
                        .help("Sign in to this organization"),
                ),
        )
        .subcommand(
            Command::new("exchange")
                .about("Exchange an authorization code and store the session")
                .arg(Arg::new("code").required(true).index(1)),
        )
        .subcommand(
            Command::new("session")
                .about("Inspect or manage the stored session")
                .subcommand(
                    Command::new("show")
                        .about("Print the stored session")
                        .arg(
                            Arg::new("tokens")
                                .long("tokens")
                                .action(ArgAction::SetTrue)
                                .help("Include the raw tokens"),
                        ),
                )
                .subcommand(Command::new("check").about("Check freshness, refreshing when due"))
                .subcommand(Command::new("refresh").about("Refresh the session now"))
                .subcommand(Command::new("clear").about("Delete the stored session")),
        )
        .subcommand(Command::new("orgs").about("List the signed-in user's organizations"))
        .subcommand(
            Command::new("switch-org")
                .about("Switch the session to another organization")
                .arg(Arg::new("organization-id").required(true).index(1)),
        )
        .subcommand(Command::new("signout").about("Sign out and clear the stored session"))
}

fn required<'a>(matches: &'a ArgMatches, id: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| RelayError::validation(format!("{} is required", id)))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn auth_client() -> Result<AuthClient> {
    let config = Config::load()?;
    let relay = Arc::new(RelayClient::new(&config.client)?);
    let store = Arc::new(FileStore::new(config.client.session_dir()));
    Ok(AuthClient::new(relay, store, &config.session))
}

async fn handle_serve_command(matches: &ArgMatches) -> Result<()> {
    let mut config = Config::load()?;

    if let Some(host) = matches.get_one::<String>("host") {
        config.http.host = host.clone();
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        config.http.port = *port;
    }

    println!(
        "🚀 Starting AuthRelay on {}:{}",
        config.http.host, config.http.port
    );
    println!("   Press Ctrl+C to stop\n");

    crate::http::start_server(config).await
}

fn handle_inspect_command(matches: &ArgMatches) -> Result<()> {
    let token = required(matches, "token")?;
    let lead_time = matches
        .get_one::<i64>("lead-time")
        .map(|secs| Duration::seconds(*secs))
        .unwrap_or_else(crate::claims::default_lead_time);
    print_json(&inspect_token(token, Utc::now(), lead_time))
}

/// Unverified claims, their normalized form and freshness at `now`
pub fn inspect_token(token: &str, now: DateTime<Utc>, lead_time: Duration) -> Value {
    let claims = decode(token);
    let expires_at = claims.expires_at();
    let freshness = assess_freshness(expires_at, now, lead_time);

    json!({
        "claims": claims,
        "session": normalize(&claims),
        "expiresAt": expires_at
            .and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0))
            .map(|at| at.to_rfc3339()),
        "freshness": freshness.as_str(),
    })
}

async fn handle_session_command(matches: &ArgMatches) -> Result<()> {
    let client = auth_client()?;
    let sessions = client.sessions();

    match matches.subcommand() {
        Some(("show", sub)) => {
            let Some(record) = sessions.get_session().await? else {
                println!("Not signed in");
                return Ok(());
            };
            let freshness = record.freshness(Utc::now(), sessions.lead_time());
            let mut shown = json!({
                "user": record.user,
                "identity": record.identity(),
                "freshness": freshness.as_str(),
                "session": record.session,
            });
            if sub.get_flag("tokens") {
                shown["accessToken"] = json!(record.access_token);
                shown["refreshToken"] = json!(record.refresh_token);
            }
            print_json(&shown)
        }
        Some(("check", _)) => {
            match client.current_session().await? {
                SessionStatus::SignedOut => println!("Not signed in"),
                SessionStatus::Active { record, freshness } => {
                    println!("{} ({})", record.user.display_name(), freshness)
                }
                SessionStatus::Refreshed(record) => {
                    println!("{} (refreshed)", record.user.display_name())
                }
            }
            Ok(())
        }
        Some(("refresh", _)) => {
            let record = client.refresh().await?;
            println!("Refreshed session for {}", record.user.display_name());
            Ok(())
        }
        Some(("clear", _)) => {
            sessions.clear_session().await?;
            println!("Session cleared");
            Ok(())
        }
        _ => {
            eprintln!("Use `relay session --help` for available subcommands.");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::mint_token;

    #[test]
    fn test_cli_parses_commands() {
        let matches = build_cli()
            .try_get_matches_from(["relay", "serve", "--port", "4000"])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "serve");
        assert_eq!(sub.get_one::<u16>("port"), Some(&4000));

        let matches = build_cli()
            .try_get_matches_from(["relay", "session", "show", "--tokens"])
            .unwrap();
        let (_, session) = matches.subcommand().unwrap();
        let (name, show) = session.subcommand().unwrap();
        assert_eq!(name, "show");
        assert!(show.get_flag("tokens"));
    }

    #[test]
    fn test_cli_requires_arguments() {
        assert!(build_cli().try_get_matches_from(["relay", "exchange"]).is_err());
        assert!(build_cli().try_get_matches_from(["relay", "switch-org"]).is_err());
        assert!(
            build_cli()
                .try_get_matches_from(["relay", "serve", "--port", "http"])
                .is_err()
        );
    }

    #[test]
    fn test_inspect_token() {
        let now = Utc::now();
        let token = mint_token(&json!({
            "sub": "user_01",
            "exp": (now + Duration::minutes(2)).timestamp(),
            "roles": ["admin"],
            "feature_flags": [{"id": "beta", "name": "Beta", "enabled": false}]
        }));

        let report = inspect_token(&token, now, Duration::minutes(5));
        assert_eq!(report["claims"]["sub"], "user_01");
        assert_eq!(report["session"]["role"]["slug"], "admin");
        assert_eq!(report["session"]["featureFlags"][0]["enabled"], false);
        assert_eq!(report["freshness"], "needs_refresh");
        assert!(report["expiresAt"].is_string());
    }

    #[test]
    fn test_inspect_garbage_token() {
        let report = inspect_token("garbage", Utc::now(), Duration::minutes(5));
        assert_eq!(report["claims"], json!({}));
        assert_eq!(report["freshness"], "unknown");
        assert_eq!(report["expiresAt"], Value::Null);
        assert_eq!(report["session"]["roles"], json!([]));
    }
}
