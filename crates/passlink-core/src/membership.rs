//! Membership gate: "is this user in the channel?" with a fail-closed policy.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    domain::{ChannelRef, UserId},
    Result,
};

/// Status reported by the membership oracle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Banned,
}

impl MemberStatus {
    pub fn grants_access(self) -> bool {
        matches!(
            self,
            MemberStatus::Creator | MemberStatus::Administrator | MemberStatus::Member
        )
    }
}

/// Remote service answering membership queries (Telegram `getChatMember`).
#[async_trait]
pub trait MembershipOracle: Send + Sync {
    async fn query(&self, channel: &ChannelRef, user: UserId) -> Result<MemberStatus>;
}

pub struct MembershipGate {
    oracle: Arc<dyn MembershipOracle>,
    channel: ChannelRef,
    timeout: Duration,
}

impl MembershipGate {
    pub fn new(oracle: Arc<dyn MembershipOracle>, channel: ChannelRef, timeout: Duration) -> Self {
        Self {
            oracle,
            channel,
            timeout,
        }
    }

    pub fn channel(&self) -> &ChannelRef {
        &self.channel
    }

    /// Oracle errors and timeouts count as "not a member".
    pub async fn is_member(&self, user: UserId) -> bool {
        match tokio::time::timeout(self.timeout, self.oracle.query(&self.channel, user)).await {
            Ok(Ok(status)) => {
                tracing::debug!(user = user.0, ?status, "membership checked");
                status.grants_access()
            }
            Ok(Err(e)) => {
                tracing::warn!(user = user.0, error = %e, "membership check failed; denying");
                false
            }
            Err(_) => {
                tracing::warn!(
                    user = user.0,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "membership check timed out; denying"
                );
                false
            }
        }
    }
}
