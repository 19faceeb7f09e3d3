//! Poll loop driving the meter
//!
//! The poller owns the register source exclusively, so exactly one read is
//! on the wire at any time. Each iteration fetches the groups of its
//! register map in order and publishes a group only once all of its fields
//! have decoded.

use crate::error::{ExporterError, Result};
use crate::identity::DeviceIdentity;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::metrics::MetricSink;
use crate::modbus::{RegisterSource, fetch};
use crate::register_map::{EM540_POLL_GROUPS, RegisterGroup};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Poller lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Identification has not completed yet
    Priming,
    /// Identification done; polling until shutdown
    Polling,
}

/// Outcome of one poll iteration
#[derive(Debug)]
pub struct PollReport {
    /// Groups decoded and published, in order
    pub published: Vec<&'static str>,
    /// Group that aborted the iteration, with its error
    pub failed: Option<(&'static str, ExporterError)>,
}

impl PollReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_none()
    }
}

/// Fetch-decode-publish loop for one meter
pub struct Poller<S, K: ?Sized> {
    source: S,
    sink: Arc<K>,
    unit_id: u8,
    groups: &'static [RegisterGroup],
    interval: Duration,
    state: PollerState,
    logger: StructuredLogger,
}

impl<S, K> Poller<S, K>
where
    S: RegisterSource,
    K: MetricSink + ?Sized,
{
    /// Create a poller for the EM540 register map
    pub fn new(source: S, sink: Arc<K>, unit_id: u8, interval: Duration) -> Self {
        Self {
            source,
            sink,
            unit_id,
            groups: &EM540_POLL_GROUPS,
            interval,
            state: PollerState::Priming,
            logger: get_logger_with_context(LogContext::new("poller").with_unit_id(unit_id)),
        }
    }

    /// Use a different register map
    pub fn with_groups(mut self, groups: &'static [RegisterGroup]) -> Self {
        self.groups = groups;
        self
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    /// Identify the device and switch to polling. A failure here means the
    /// register map cannot be trusted; the poller stays in `Priming`.
    pub async fn prime(&mut self) -> Result<DeviceIdentity> {
        self.logger.info("Reading device identification");
        let identity = DeviceIdentity::read(&mut self.source, self.unit_id).await?;
        self.logger.info(&format!(
            "Identified {} (serial {}, firmware {}.{})",
            identity.model, identity.serial, identity.firmware.major, identity.firmware.minor
        ));
        self.state = PollerState::Polling;
        Ok(identity)
    }

    /// Run one iteration. The first failing group stops the iteration;
    /// groups after it keep their previously published values.
    pub async fn poll_once(&mut self) -> PollReport {
        let mut published = Vec::with_capacity(self.groups.len());

        for group in self.groups {
            match self.read_group(group).await {
                Ok(fields) => {
                    self.sink.publish(&fields);
                    published.push(group.name);
                }
                Err(e) => {
                    self.sink.record_failure(group.name);
                    return PollReport {
                        published,
                        failed: Some((group.name, e)),
                    };
                }
            }
        }

        self.sink.record_success(chrono::Utc::now());
        PollReport {
            published,
            failed: None,
        }
    }

    async fn read_group(
        &mut self,
        group: &RegisterGroup,
    ) -> Result<Vec<crate::register_map::MeasurementField>> {
        let block = fetch(&mut self.source, self.unit_id, group.start, group.count).await?;
        group.decode(&block)
    }

    /// Poll until `shutdown` flips to true or its sender is dropped.
    ///
    /// Recoverable errors skip the rest of the iteration; anything else ends
    /// the loop with that error.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if self.state == PollerState::Priming {
            self.prime().await?;
        }

        self.logger.info(&format!(
            "Polling every {} ms",
            self.interval.as_millis()
        ));

        loop {
            let stop = *shutdown.borrow();
            if stop {
                break;
            }

            let report = self.poll_once().await;
            match report.failed {
                None => self.logger.debug("Poll cycle completed"),
                Some((group, e)) if e.is_poll_recoverable() => {
                    self.logger
                        .warn(&format!("Poll cycle aborted at {} group: {}", group, e));
                }
                Some((group, e)) => {
                    self.logger
                        .error(&format!("Poll cycle failed at {} group: {}", group, e));
                    return Err(e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.logger.info("Shutdown signal received, poller stopped");
        Ok(())
    }

    /// Give back the register source
    pub fn into_source(self) -> S {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MemorySink;
    use crate::register_map::{Metric, Phase};
    use std::collections::HashMap;

    /// Serves fixed blocks by start address; missing addresses fail
    struct FixedSource {
        blocks: HashMap<u16, Vec<u16>>,
        reads: Vec<u16>,
    }

    #[async_trait::async_trait]
    impl RegisterSource for FixedSource {
        async fn read_holding_registers(
            &mut self,
            _unit_id: u8,
            address: u16,
            _count: u16,
        ) -> Result<Vec<u16>> {
            self.reads.push(address);
            self.blocks
                .get(&address)
                .cloned()
                .ok_or_else(|| ExporterError::transport("no response"))
        }
    }

    fn poller(blocks: HashMap<u16, Vec<u16>>) -> (Poller<FixedSource, MemorySink>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let source = FixedSource {
            blocks,
            reads: Vec::new(),
        };
        (
            Poller::new(source, sink.clone(), 1, Duration::from_millis(10)),
            sink,
        )
    }

    #[tokio::test]
    async fn test_groups_read_in_order() {
        let blocks = HashMap::from([
            (0x0000, vec![0u16; 50]),
            (0x0500, vec![0u16; 28]),
            (0x053c, vec![50_000, 0]),
        ]);
        let (mut p, sink) = poller(blocks);
        let report = p.poll_once().await;
        assert!(report.is_success());
        assert_eq!(report.published, vec!["electrical", "energy", "frequency"]);
        assert_eq!(p.into_source().reads, vec![0x0000, 0x0500, 0x053c]);
        assert_eq!(sink.get(Metric::Frequency, None), Some(50.0));
        assert!(sink.last_success().is_some());
    }

    #[tokio::test]
    async fn test_failed_fetch_stops_iteration() {
        let blocks = HashMap::from([(0x0000, vec![0u16; 50])]);
        let (mut p, sink) = poller(blocks);
        let report = p.poll_once().await;
        assert_eq!(report.published, vec!["electrical"]);
        let (group, err) = report.failed.unwrap();
        assert_eq!(group, "energy");
        assert!(err.is_poll_recoverable());
        assert_eq!(sink.failures("energy"), 1);
        assert_eq!(sink.get(Metric::PowerFactor, Some(Phase::L3)), Some(0.0));
        assert_eq!(sink.get(Metric::WattHours, Some(Phase::Sys)), None);
        assert!(sink.last_success().is_none());
        // Frequency was never requested
        assert_eq!(p.into_source().reads, vec![0x0000, 0x0500]);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let blocks = HashMap::from([
            (0x000b, vec![0x06e1]),
            (0x5000, vec![0x4B41; 8]),
            (0x0302, vec![0x0312]),
            (0x1002, vec![0]),
            (0x1103, vec![0]),
        ]);
        let (mut p, sink) = poller(blocks);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let result = p.run(rx).await;
            (result, p.state())
        });
        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.failures("electrical") == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
        tx.send(true).unwrap();
        let (result, state) = handle.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(state, PollerState::Polling);
    }

    #[tokio::test]
    async fn test_run_fails_when_identification_fails() {
        let (mut p, _sink) = poller(HashMap::from([(0x000b, vec![0x0001])]));
        let (_tx, rx) = watch::channel(false);
        let err = p.run(rx).await.unwrap_err();
        assert!(matches!(err, ExporterError::UnknownDeviceCode { .. }));
        assert_eq!(p.state(), PollerState::Priming);
    }
}
