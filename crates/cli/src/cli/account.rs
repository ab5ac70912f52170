use clap::Args;
use serde_json::json;
use spendtrack_client::{ApiClient, CurrentUser, Registration, SignIn};

use super::print_json;

#[derive(Debug, Args)]
pub(crate) struct LoginArgs {
    /// Account email
    #[arg(long)]
    email: String,

    /// Account password
    #[arg(long, env = "SPENDTRACK_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Debug, Args)]
pub(crate) struct RegisterArgs {
    /// Display name
    #[arg(long)]
    name: String,

    /// Account email
    #[arg(long)]
    email: String,

    /// Account password
    #[arg(long, env = "SPENDTRACK_PASSWORD", hide_env_values = true)]
    password: String,
}

pub(crate) async fn login(client: &ApiClient, args: LoginArgs) -> Result<(), String> {
    let sign_in = SignIn {
        email: args.email,
        password: args.password,
    };

    let user = client
        .login(&sign_in)
        .await
        .map_err(|error| format!("failed to sign in: {error}"))?;

    println!(
        "signed in as {}",
        user.as_ref()
            .map_or(sign_in.email.as_str(), CurrentUser::display_name)
    );

    Ok(())
}

pub(crate) async fn register(client: &ApiClient, args: RegisterArgs) -> Result<(), String> {
    let registration = Registration {
        name: args.name,
        email: args.email,
        password: args.password,
    };

    let user = client
        .register(&registration)
        .await
        .map_err(|error| format!("failed to register: {error}"))?;

    println!(
        "registered and signed in as {}",
        user.as_ref()
            .map_or(registration.name.as_str(), CurrentUser::display_name)
    );

    Ok(())
}

pub(crate) async fn logout(client: &ApiClient) -> Result<(), String> {
    if !client.session().is_signed_in().await {
        println!("not signed in");
        return Ok(());
    }

    client
        .logout()
        .await
        .map_err(|error| format!("failed to sign out: {error}"))?;

    println!("signed out");

    Ok(())
}

pub(crate) async fn whoami(client: &ApiClient) -> Result<(), String> {
    let stored = client
        .session()
        .snapshot()
        .await
        .ok_or_else(|| "not signed in; run `spendtrack login`".to_string())?;

    print_json(&json!({
        "user": stored.user,
        "signed_in_at": stored.signed_in_at,
        "refreshed_at": stored.refreshed_at,
    }))
}
