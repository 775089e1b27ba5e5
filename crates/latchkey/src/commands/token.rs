//! Token command - print a usable access token.

use anyhow::Result;
use clap::Args;
use latchkey_oauth::CancellationToken;

use super::Context;

/// Arguments for the token command.
#[derive(Args, Debug)]
pub struct TokenArgs {}

/// Run the token command.
///
/// Refreshes the stored session when the access token is inside the refresh
/// margin. Prints only the token on stdout so the output can be captured.
pub async fn run(_args: TokenArgs, ctx: &Context) -> Result<()> {
    let config = ctx.oauth_config(true)?;
    let tokens = ctx.token_manager(&config)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    match tokens.get_access_token(&cancel).await {
        Some(token) => {
            println!("{}", token);
            Ok(())
        }
        None => {
            if ctx.verbose && tokens.has_session() {
                eprintln!("Stored session could not be refreshed; it is kept for a later retry.");
            }
            anyhow::bail!("No valid session. Run 'latchkey auth login'.")
        }
    }
}
