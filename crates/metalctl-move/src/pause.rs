//! Checking that the source reconciler honors the paused marker
//!
//! The bare metal operator is expected to stop writing to a host once the
//! paused annotation is set, but nothing in the store enforces it. After
//! pausing, each host is re-read until its resourceVersion has been stable
//! for a quiet period. A host that keeps changing past the timeout, or that
//! loses its marker, fails the migration before anything is copied.

use std::time::Duration;

use metalctl_common::{ResourceClient, ResourceKey};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::MoveError;
use crate::orchestrator::MovePhase;

/// How to confirm a pause took effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PauseObservation {
    /// Trust the marker without checking
    #[default]
    Disabled,
    /// Require each paused object to stop changing
    Quiet {
        /// How long the resourceVersion must stay unchanged
        quiet_period: Duration,
        /// Upper bound on the wait for each object
        timeout: Duration,
        /// Delay between reads
        poll_interval: Duration,
    },
}

impl PauseObservation {
    /// Quiet-period check polling at a fifth of the quiet period
    ///
    /// Fails when the quiet period does not fit inside the timeout.
    pub fn quiet(quiet_period: Duration, timeout: Duration) -> Result<Self, MoveError> {
        let observation = PauseObservation::Quiet {
            quiet_period,
            timeout,
            poll_interval: (quiet_period / 5).max(Duration::from_millis(100)),
        };
        observation.validate()?;
        Ok(observation)
    }

    /// Reject a quiet-period check that could never pass
    pub fn validate(&self) -> Result<(), MoveError> {
        match *self {
            PauseObservation::Quiet {
                quiet_period,
                timeout,
                ..
            } if quiet_period >= timeout => Err(MoveError::InvalidPauseObservation {
                quiet_period,
                timeout,
            }),
            _ => Ok(()),
        }
    }
}

/// Wait until every object in `keys` is paused and no longer changing
pub async fn await_quiescence(
    client: &dyn ResourceClient,
    keys: &[ResourceKey],
    observation: PauseObservation,
) -> Result<(), MoveError> {
    observation.validate()?;
    let PauseObservation::Quiet {
        quiet_period,
        timeout,
        poll_interval,
    } = observation
    else {
        return Ok(());
    };

    for key in keys {
        let started = Instant::now();
        let mut last_version = read_paused_version(client, key).await?;
        let mut stable_since = started;

        while stable_since.elapsed() < quiet_period {
            if started.elapsed() >= timeout {
                return Err(MoveError::PauseNotObserved {
                    resource: key.clone(),
                    timeout,
                });
            }
            tokio::time::sleep(poll_interval).await;

            let version = read_paused_version(client, key).await?;
            if version != last_version {
                debug!(resource = %key, resource_version = ?version, "Paused object still changing");
                last_version = version;
                stable_since = Instant::now();
            }
        }
        debug!(resource = %key, "Pause observed");
    }

    if !keys.is_empty() {
        info!(objects = keys.len(), "Source reconciler observed pause");
    }
    Ok(())
}

async fn read_paused_version(
    client: &dyn ResourceClient,
    key: &ResourceKey,
) -> Result<Option<String>, MoveError> {
    let current = client
        .get(&key.gvk, &key.namespace, &key.name)
        .await
        .map_err(|source| MoveError::Store {
            phase: MovePhase::PausedSource,
            source,
        })?;
    if !current.is_paused() {
        return Err(MoveError::PauseReverted {
            resource: key.clone(),
        });
    }
    Ok(current.resource_version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use metalctl_common::testing::MockResourceClient;
    use metalctl_common::{GroupVersionKind, ManagedResource, PAUSED_ANNOTATION, PAUSED_VALUE};

    fn host_key() -> ResourceKey {
        ResourceKey::new(GroupVersionKind::new("metal3.io", "v1alpha1", "BareMetalHost"), "a", "h1")
    }

    fn paused_host(version: usize) -> ManagedResource {
        let mut host = ManagedResource::new(host_key().gvk, "a", "h1");
        host.set_annotation(PAUSED_ANNOTATION, PAUSED_VALUE);
        host.resource_version = Some(version.to_string());
        host
    }

    fn observation() -> PauseObservation {
        PauseObservation::Quiet {
            quiet_period: Duration::from_secs(3),
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_disabled_does_not_read() {
        let mut client = MockResourceClient::new();
        client.expect_get().never();
        await_quiescence(&client, &[host_key()], PauseObservation::Disabled)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_object_passes() {
        let mut client = MockResourceClient::new();
        client.expect_get().returning(|_, _, _| Ok(paused_host(5)));
        await_quiescence(&client, &[host_key()], observation()).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_object_that_settles_passes() {
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = reads.clone();
        let mut client = MockResourceClient::new();
        client.expect_get().returning(move |_, _, _| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(paused_host(n.min(3)))
        });
        await_quiescence(&client, &[host_key()], observation()).await.unwrap();
        assert!(reads.load(Ordering::SeqCst) >= 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_object_that_keeps_changing_fails() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut client = MockResourceClient::new();
        client.expect_get().returning(move |_, _, _| {
            Ok(paused_host(counter.fetch_add(1, Ordering::SeqCst)))
        });
        let err = await_quiescence(&client, &[host_key()], observation())
            .await
            .unwrap_err();
        assert!(matches!(err, MoveError::PauseNotObserved { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpaused_object_fails() {
        let mut client = MockResourceClient::new();
        client.expect_get().returning(|_, _, _| {
            let mut host = paused_host(1);
            host.remove_annotation(PAUSED_ANNOTATION);
            Ok(host)
        });
        let err = await_quiescence(&client, &[host_key()], observation())
            .await
            .unwrap_err();
        assert!(matches!(err, MoveError::PauseReverted { .. }));
    }

    #[test]
    fn test_quiet_poll_interval() {
        match PauseObservation::quiet(Duration::from_secs(10), Duration::from_secs(60)).unwrap() {
            PauseObservation::Quiet { poll_interval, .. } => {
                assert_eq!(poll_interval, Duration::from_secs(2))
            }
            PauseObservation::Disabled => panic!("expected quiet observation"),
        }
    }

    #[test]
    fn test_quiet_period_must_fit_in_timeout() {
        let err = PauseObservation::quiet(Duration::from_secs(5), Duration::from_secs(3)).unwrap_err();
        assert!(matches!(err, MoveError::InvalidPauseObservation { .. }));
        assert!(PauseObservation::quiet(Duration::from_secs(5), Duration::from_secs(5)).is_err());
        assert!(PauseObservation::Disabled.validate().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsatisfiable_check_fails_before_reading() {
        let mut client = MockResourceClient::new();
        client.expect_get().never();
        let observation = PauseObservation::Quiet {
            quiet_period: Duration::from_secs(5),
            timeout: Duration::from_secs(3),
            poll_interval: Duration::from_secs(1),
        };
        let err = await_quiescence(&client, &[host_key()], observation)
            .await
            .unwrap_err();
        assert!(matches!(err, MoveError::InvalidPauseObservation { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_host_passes_with_short_timeout() {
        let mut client = MockResourceClient::new();
        client.expect_get().returning(|_, _, _| Ok(paused_host(7)));
        let observation = PauseObservation::quiet(Duration::from_secs(2), Duration::from_secs(3)).unwrap();
        await_quiescence(&client, &[host_key()], observation).await.unwrap();
    }
}
