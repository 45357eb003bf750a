//! Sign-in, registration and account commands.

use bugdesk_client::views::View;
use bugdesk_core::{Email, LoginDto, RegisterDto, Role, User};

use super::{CliError, Context};
use crate::output;

/// Sign in and persist the session.
pub async fn login(ctx: &Context, email: &str, password: String) -> Result<(), CliError> {
    let credentials = LoginDto {
        email: Email::parse(email)?,
        password,
    };
    let user = ctx.app.session().login(&credentials).await?;
    tracing::info!(user_id = %user.id, "Signed in");
    greet(ctx, &user)
}

/// Create an account, then sign in with it.
pub async fn register(
    ctx: &Context,
    email: &str,
    password: String,
    full_name: String,
    role: Option<String>,
) -> Result<(), CliError> {
    let details = RegisterDto {
        email: Email::parse(email)?,
        password,
        full_name,
        role: role.map(Role::from),
    };
    let user = ctx.app.session().register(&details).await?;
    tracing::info!(user_id = %user.id, "Account created");
    greet(ctx, &user)
}

/// Forget the session and every cached read.
pub fn logout(ctx: &Context) {
    ctx.app.logout();
    output::line("Signed out.");
}

/// Show the signed-in account, optionally re-reading it from the server.
pub async fn whoami(ctx: &Context, refresh: bool) -> Result<(), CliError> {
    ctx.require(View::Dashboard)?;

    let user = if refresh {
        match ctx.app.session().refresh_current_user().await {
            Ok(user) => user,
            Err(e) if e.is_auth() => return Err(CliError::NotSignedIn),
            Err(e) => return Err(e.into()),
        }
    } else {
        ctx.app.session().current_user().ok_or(CliError::NotSignedIn)?
    };

    if ctx.json {
        output::json(&user)
    } else {
        output::user(&user);
        Ok(())
    }
}

fn greet(ctx: &Context, user: &User) -> Result<(), CliError> {
    if ctx.json {
        return output::json(user);
    }
    output::line(format!("Signed in as {} ({})", user.full_name, user.role));
    Ok(())
}
