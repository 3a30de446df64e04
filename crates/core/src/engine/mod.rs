//! Per-tick driver tying the kit, the capture tools and persistence together.

use std::collections::VecDeque;

use crate::capture::{Monitor, Oscilloscope};
use crate::kit::{Dispatch, Kit, PadHit};
use crate::protocol::Frame;
use crate::scanner::Scanner;
use crate::storage::Storage;
use crate::transport::Transport;
use crate::{KitConfig, Result};

/// Owns everything that changes while the module runs.
///
/// Inbound bytes are only queued by [`Engine::receive`]; they take effect at
/// the start of the next [`Engine::tick`], so configuration never changes in
/// the middle of a pad's tick.
#[derive(Debug)]
pub struct Engine<S: Storage> {
    config: KitConfig,
    kit: Kit,
    monitor: Monitor,
    oscilloscope: Oscilloscope,
    storage: S,
    inbound: VecDeque<Vec<u8>>,
    inbound_overflowing: bool,
    rejected: usize,
}

impl<S: Storage> Engine<S> {
    /// Builds the kit and restores every intact pad record from `storage`.
    pub fn new(config: KitConfig, storage: S) -> Result<Self> {
        let mut kit = Kit::new(&config)?;
        let restored = kit.load_settings(&storage);
        tracing::info!(
            restored,
            pads = config.pad_count,
            sensors = config.sensor_count,
            "engine ready"
        );

        Ok(Self {
            inbound: VecDeque::with_capacity(config.inbound_queue_capacity),
            monitor: Monitor::new(&config),
            oscilloscope: Oscilloscope::new(&config),
            config,
            kit,
            storage,
            inbound_overflowing: false,
            rejected: 0,
        })
    }

    pub fn config(&self) -> &KitConfig {
        &self.config
    }

    pub fn kit(&self) -> &Kit {
        &self.kit
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn oscilloscope(&self) -> &Oscilloscope {
        &self.oscilloscope
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Number of inbound frames dropped as malformed, invalid, or arriving
    /// while the inbound queue was full.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Number of inbound frames waiting for the next tick.
    pub fn pending(&self) -> usize {
        self.inbound.len()
    }

    /// Queues one complete inbound frame. When the queue is full the frame
    /// is dropped and counted as rejected.
    pub fn receive(&mut self, bytes: &[u8]) {
        if self.inbound.len() >= self.config.inbound_queue_capacity {
            self.rejected += 1;
            if !self.inbound_overflowing {
                tracing::warn!(
                    capacity = self.config.inbound_queue_capacity,
                    "inbound queue full, dropping frames"
                );
                self.inbound_overflowing = true;
            }
            return;
        }
        self.inbound.push_back(bytes.to_vec());
    }

    /// Runs one sampling tick. `scanner` must already hold this tick's
    /// readings.
    pub fn tick(
        &mut self,
        now: u32,
        scanner: &dyn Scanner,
        transport: &mut dyn Transport,
    ) -> Vec<PadHit> {
        self.apply_inbound(transport);
        let hits = self.kit.process(now, scanner, &mut self.monitor, transport);
        self.oscilloscope.process(scanner, transport);
        hits
    }

    /// Writes every pad record, whether or not it changed.
    pub fn save_settings(&mut self) -> Result<()> {
        self.kit.save_settings(&mut self.storage)
    }

    fn apply_inbound(&mut self, transport: &mut dyn Transport) {
        self.inbound_overflowing = false;
        while let Some(bytes) = self.inbound.pop_front() {
            let frame = match Frame::decode(&bytes, self.config.vendor_id) {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::debug!(%err, len = bytes.len(), "dropping inbound frame");
                    self.rejected += 1;
                    continue;
                }
            };

            let outcome = self.kit.dispatch(
                &frame,
                &mut self.monitor,
                &mut self.oscilloscope,
                transport,
            );
            match outcome {
                Ok(Dispatch::PadUpdated(slot)) => {
                    if let Err(err) = self.kit.save_pad(slot, &mut self.storage) {
                        tracing::warn!(pad = slot, %err, "failed to persist pad");
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(command = ?frame.command, %err, "rejected inbound frame");
                    self.rejected += 1;
                }
            }
        }
    }
}
