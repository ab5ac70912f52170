use clap::Args;
use serde_json::Value;
use spendtrack_client::{ApiClient, Method, RequestError};

use super::print_json;

#[derive(Debug, Args)]
pub(crate) struct ReadArgs {
    /// API path below `/api`, e.g. `/expenses`
    pub(super) path: String,

    /// Fail on 401 instead of refreshing the access token
    #[arg(long)]
    pub(super) no_refresh: bool,
}

#[derive(Debug, Args)]
pub(crate) struct WriteArgs {
    /// API path below `/api`, e.g. `/income`
    pub(super) path: String,

    /// JSON request body
    #[arg(short, long, value_parser = parse_json)]
    pub(super) data: Option<Value>,

    /// Fail on 401 instead of refreshing the access token
    #[arg(long)]
    pub(super) no_refresh: bool,
}

pub(crate) async fn read(client: &ApiClient, method: Method, args: ReadArgs) -> Result<(), String> {
    send(client, method, &args.path, None, args.no_refresh).await
}

pub(crate) async fn write(
    client: &ApiClient,
    method: Method,
    args: WriteArgs,
) -> Result<(), String> {
    send(
        client,
        method,
        &args.path,
        args.data.as_ref(),
        args.no_refresh,
    )
    .await
}

async fn send(
    client: &ApiClient,
    method: Method,
    path: &str,
    body: Option<&Value>,
    no_refresh: bool,
) -> Result<(), String> {
    let value = client
        .request(method, path, body, !no_refresh)
        .await
        .map_err(|error| match error {
            RequestError::Api(error) if error.is_transport() => {
                format!("{method} {path} failed: backend unreachable: {}", error.message)
            }
            error => format!("{method} {path} failed: {error}"),
        })?;

    print_json(&value)
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|error| format!("invalid JSON: {error}"))
}
