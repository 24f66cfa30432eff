//! Local etcd replica process.

use crate::bootstrap::{ClusterState, LocalMember};
use hashlookup_core::InitialCluster;
use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// A running etcd child process. Killed when dropped.
pub struct EtcdProcess {
    child: Child,
}

impl EtcdProcess {
    /// Command line for a replica named after `member` joining `cluster`.
    pub fn args(member: &LocalMember, cluster: &InitialCluster, state: ClusterState) -> Vec<String> {
        vec![
            "--name".into(),
            member.name.clone(),
            "--listen-client-urls".into(),
            member.client_url.clone(),
            "--advertise-client-urls".into(),
            member.client_url.clone(),
            "--listen-peer-urls".into(),
            member.peer_url.clone(),
            "--initial-advertise-peer-urls".into(),
            member.peer_url.clone(),
            "--initial-cluster".into(),
            cluster.to_string(),
            "--initial-cluster-state".into(),
            state.to_string(),
        ]
    }

    /// Start `binary` with the replica arguments. Output is inherited.
    pub fn spawn(
        binary: &str,
        member: &LocalMember,
        cluster: &InitialCluster,
        state: ClusterState,
    ) -> io::Result<Self> {
        let args = Self::args(member, cluster, state);
        let child = Command::new(binary)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        info!(
            binary = %binary,
            pid = ?child.id(),
            member_name = %member.name,
            cluster_state = %state,
            initial_cluster = %cluster,
            "Started etcd replica"
        );
        Ok(Self { child })
    }

    /// Resolves when the replica exits on its own.
    pub async fn exited(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Kill the replica and reap it.
    pub async fn shutdown(mut self) -> io::Result<()> {
        if let Err(e) = self.child.start_kill() {
            // Already exited.
            warn!(error = %e, "etcd replica kill failed");
        }
        let status = self.child.wait().await?;
        info!(status = %status, "etcd replica stopped");
        Ok(())
    }
}
