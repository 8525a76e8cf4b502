//! Opens the remote session for an endpoint.

use std::sync::Arc;

use burrow_remote::RemoteSession;

use crate::cli::PutArgs;
use crate::config::Config;

#[cfg(feature = "sftp")]
pub fn connect(args: &PutArgs, config: &Config) -> anyhow::Result<Arc<dyn RemoteSession>> {
    use std::time::Duration;

    use anyhow::Context;
    use burrow_remote::{SftpConfig, SftpSession};

    let username = args
        .endpoint
        .user
        .clone()
        .or_else(|| config.sshclient.username.clone())
        .or_else(crate::endpoint::local_username)
        .context("no user name given and none found in the environment")?;

    tracing::info!(endpoint = %args.endpoint, user = %username, "connecting");
    let session = SftpSession::connect(SftpConfig {
        host: args.endpoint.host.clone(),
        port: args.endpoint.port,
        username,
        identity: args
            .identity
            .clone()
            .or_else(|| config.sshclient.identity.clone()),
        known_hosts: config.sshclient.known_hosts.clone(),
        insecure: args.insecure || config.sshclient.insecure,
        connect_timeout: Duration::from_secs(config.sshclient.connect_timeout_secs),
    });
    Ok(Arc::new(session))
}

#[cfg(not(feature = "sftp"))]
pub fn connect(args: &PutArgs, _config: &Config) -> anyhow::Result<Arc<dyn RemoteSession>> {
    anyhow::bail!(
        "cannot reach {}: SFTP support was not compiled in (rebuild with --features sftp)",
        args.endpoint
    )
}
