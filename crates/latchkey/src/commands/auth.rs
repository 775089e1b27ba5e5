//! Auth command - sign-in and session management.

use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Subcommand};
use latchkey_oauth::{
    AuthOutcome, Authenticator, BrowserLauncher, CancellationToken, HttpTokenClient,
    SystemBrowser,
};

use super::Context;

/// Arguments for the auth command.
#[derive(Args, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommand,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Sign in through the browser
    Login {
        /// Sign in again even if the current session is still valid
        #[arg(long)]
        force: bool,
    },

    /// Show session status
    Status,

    /// Sign out and forget stored tokens
    Logout,
}

/// Run the auth command.
pub async fn run(args: AuthArgs, ctx: &Context) -> Result<()> {
    match args.command {
        AuthCommand::Login { force } => cmd_login(force, ctx).await,
        AuthCommand::Status => cmd_status(ctx).await,
        AuthCommand::Logout => cmd_logout(ctx).await,
    }
}

/// Prints the URL before handing it to the system browser, so a failed
/// launch still leaves the user a way forward.
#[derive(Debug)]
struct AnnouncingBrowser;

impl BrowserLauncher for AnnouncingBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        println!("Opening your browser to sign in. If it does not open, visit:");
        println!();
        println!("  {}", url);
        println!();
        let result = SystemBrowser.open(url);
        if result.is_err() {
            println!("(Could not open browser automatically)");
        }
        result
    }
}

async fn cmd_login(force: bool, ctx: &Context) -> Result<()> {
    let config = ctx.oauth_config(true)?;
    let tokens = ctx.token_manager(&config)?;

    if !force
        && tokens.is_usable()
        && let Some(info) = tokens.token_info()
    {
        println!(
            "Already authenticated (expires in {})",
            info.expires_in_display()
        );
        println!("Run 'latchkey auth login --force' to sign in again.");
        return Ok(());
    }

    let endpoint = Arc::new(HttpTokenClient::new(&config)?);
    let authenticator = Authenticator::new(config, endpoint, tokens.clone())
        .with_browser(Arc::new(AnnouncingBrowser));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    println!("Waiting for sign-in to complete (Ctrl+C to cancel)...");
    match authenticator.authenticate(&cancel).await {
        AuthOutcome::Succeeded => {
            println!();
            println!("Authentication successful!");
            if let Some(info) = tokens.token_info() {
                println!("Token expires in: {}", info.expires_in_display());
                if !info.has_refresh_token {
                    println!("Note: the provider did not issue a refresh token.");
                }
            }
            Ok(())
        }
        AuthOutcome::Failed(failure) => {
            if ctx.verbose {
                eprintln!("{} ({})", failure.user_message, failure);
            }
            anyhow::bail!("{}", failure.user_message)
        }
    }
}

async fn cmd_status(ctx: &Context) -> Result<()> {
    let config = ctx.oauth_config(false)?;
    let tokens = ctx.token_manager(&config)?;

    println!("Authentication Status");
    println!("---------------------");

    match tokens.token_info() {
        Some(info) => {
            println!("Session: authenticated");
            println!("  Access token: {}", info.masked_token);
            println!("  Expires: {}", info.expires_in_display());
            println!(
                "  Refresh token: {}",
                if info.has_refresh_token { "present" } else { "missing" }
            );
            if let Some(scope) = &info.scope {
                println!("  Scope: {}", scope);
            }
        }
        None => {
            println!("Session: not authenticated");
            println!("  Run 'latchkey auth login' to sign in");
        }
    }

    Ok(())
}

async fn cmd_logout(ctx: &Context) -> Result<()> {
    let config = ctx.oauth_config(false)?;
    let tokens = ctx.token_manager(&config)?;

    // Erase even without a restored session: an unreadable token file
    // still has to go.
    let had_session = tokens.has_session();
    tokens
        .sign_out()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to remove stored tokens: {}", e))?;
    if had_session {
        println!("Signed out. Stored tokens removed.");
    } else {
        println!("No session found.");
    }

    Ok(())
}
