//! Sign-up, sign-in and sign-out commands.

use clap::{Args, Subcommand};
use std::io::{self, Write};

use tally_core::{AuthResult, FederatedProvider};

use super::CommandError;
use crate::context::AppContext;

/// Authentication commands
#[derive(Args)]
pub struct AuthCommand {
    #[command(subcommand)]
    pub command: AuthSubcommand,
}

#[derive(Subcommand)]
pub enum AuthSubcommand {
    /// Create an account and sign in
    Signup {
        email: String,

        /// Password (prompted for when omitted)
        #[arg(long, short)]
        password: Option<String>,
    },

    /// Sign in with email and password
    Signin {
        email: String,

        /// Password (prompted for when omitted)
        #[arg(long, short)]
        password: Option<String>,
    },

    /// Sign in with a linked provider (google, github)
    Provider {
        provider: FederatedProvider,
    },

    /// Sign out; local data is kept
    Signout,

    /// Show who is signed in
    Status,
}

impl AuthCommand {
    /// Runs the command. `allow_prompt` is false inside the shell, where
    /// stdin belongs to the command reader.
    pub async fn run(&self, ctx: &mut AppContext, allow_prompt: bool) -> Result<(), CommandError> {
        match &self.command {
            AuthSubcommand::Signup { email, password } => {
                let password = password_or_prompt(password.as_deref(), allow_prompt)?;
                let result = ctx.session.sign_up(email, &password).await;
                finish_sign_in(ctx, result).await
            }
            AuthSubcommand::Signin { email, password } => {
                let password = password_or_prompt(password.as_deref(), allow_prompt)?;
                let result = ctx.session.sign_in(email, &password).await;
                finish_sign_in(ctx, result).await
            }
            AuthSubcommand::Provider { provider } => {
                let result = ctx.session.sign_in_with_provider(*provider).await;
                finish_sign_in(ctx, result).await
            }
            AuthSubcommand::Signout => {
                let result = ctx.session.sign_out().await;
                if !result.success {
                    return Err(CommandError::Auth(result.message));
                }
                ctx.detach_sync();
                println!("{}", result.message);
                println!("Local data was kept on this device.");
                Ok(())
            }
            AuthSubcommand::Status => {
                match ctx.session.current_user() {
                    Some(user) => {
                        println!("Signed in as {}", user.label());
                        println!("  uid: {}", user.uid);
                    }
                    None => println!("Not signed in"),
                }
                match &ctx.engine {
                    Some(_) => println!("Sync: enabled"),
                    None => println!("Sync: disabled (set sync.remote_dir to enable)"),
                }
                Ok(())
            }
        }
    }
}

async fn finish_sign_in(ctx: &mut AppContext, result: AuthResult) -> Result<(), CommandError> {
    if !result.success {
        return Err(CommandError::Auth(result.message));
    }
    println!("{}", result.message);
    if let Some(user) = result.user {
        println!("Signed in as {}", user.label());
        ctx.attach_sync(user).await;
    }
    Ok(())
}

fn password_or_prompt(password: Option<&str>, allow_prompt: bool) -> Result<String, CommandError> {
    if let Some(p) = password {
        return Ok(p.to_string());
    }
    if !allow_prompt {
        return Err(CommandError::InvalidInput(
            "Pass the password with --password".to_string(),
        ));
    }

    print!("Password: ");
    io::stdout()
        .flush()
        .map_err(|e| CommandError::Io("stdout".into(), e))?;
    let mut password = String::new();
    io::stdin()
        .read_line(&mut password)
        .map_err(|e| CommandError::Io("stdin".into(), e))?;
    Ok(password.trim_end_matches(['\r', '\n']).to_string())
}
