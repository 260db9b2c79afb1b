use crate::app::cli::Config;
use aws_config::BehaviorVersion;
use aws_sdk_sts::error::DisplayErrorContext;
use aws_sdk_sts::operation::assume_role::builders::AssumeRoleFluentBuilder;
use aws_sdk_sts::primitives::{DateTime, DateTimeFormat};
use std::fmt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Temporary credentials issued by STS for the assumed role.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: Option<DateTime>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &"** redacted **")
            .field("expiration", &self.expiration)
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum GetCredentialsError {
    #[error("Assuming the role was cancelled")]
    Cancelled,

    #[error("Failed to assume role: {}", DisplayErrorContext(source))]
    Sts { source: aws_sdk_sts::Error },

    #[error("AWS STS returned no credentials for the assumed role")]
    MissingCredentials,
}

/// Assumes `config.role_arn` using the default credential chain.
///
/// Returns [`GetCredentialsError::Cancelled`] as soon as `cancel` fires, including
/// when it was already cancelled before the call.
pub async fn get_credentials(
    config: &Config,
    cancel: &CancellationToken,
) -> Result<Credentials, GetCredentialsError> {
    let shared_config = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(GetCredentialsError::Cancelled),
        shared_config = aws_config::defaults(BehaviorVersion::latest()).load() => shared_config,
    };
    let client = aws_sdk_sts::Client::new(&shared_config);

    request_credentials(&client, config, cancel).await
}

async fn request_credentials(
    client: &aws_sdk_sts::Client,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<Credentials, GetCredentialsError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GetCredentialsError::Cancelled),
        result = assume_role(client, config) => result,
    }
}

async fn assume_role(
    client: &aws_sdk_sts::Client,
    config: &Config,
) -> Result<Credentials, GetCredentialsError> {
    info!("Calling AWS STS AssumeRole");
    debug!("Role ARN: {}", config.role_arn);
    debug!("Role session name: {}", config.role_session_name);
    debug!("Duration: {:?} seconds", config.duration_seconds());
    debug!("MFA: {}", config.serial_number.is_some());

    let response = assume_role_request(client, config)
        .send()
        .await
        .map_err(|err| GetCredentialsError::Sts { source: err.into() })?;

    let sts_creds = response
        .credentials()
        .ok_or(GetCredentialsError::MissingCredentials)?;

    let credentials = Credentials {
        access_key_id: sts_creds.access_key_id().to_string(),
        secret_access_key: sts_creds.secret_access_key().to_string(),
        session_token: sts_creds.session_token().to_string(),
        expiration: Some(*sts_creds.expiration()),
    };

    info!(
        "Assumed role, credentials expire at {}",
        sts_creds
            .expiration()
            .fmt(DateTimeFormat::DateTime)
            .unwrap_or_else(|_| "unknown".to_string())
    );
    Ok(credentials)
}

/// Optional parameters are only set when present; nothing is sent as an empty string.
fn assume_role_request(client: &aws_sdk_sts::Client, config: &Config) -> AssumeRoleFluentBuilder {
    client
        .assume_role()
        .role_arn(&config.role_arn)
        .role_session_name(&config.role_session_name)
        .set_duration_seconds(config.duration_seconds())
        .set_external_id(config.external_id.clone())
        .set_serial_number(config.serial_number.clone())
        .set_token_code(config.token_code.clone())
        .set_source_identity(config.source_identity.clone())
}
