//! Storage port for the engine's persistent decision state.
//!
//! The ledger and the channel marker are read and written through this trait
//! so the selection and boot logic can run against an in-memory fake.

use std::fs;
use std::io;

use crate::device::Channel;
use crate::layout::DeviceLayout;
use crate::ledger::IncompatibleLedger;

pub trait StatePort {
    fn load_ledger(&self) -> IncompatibleLedger;

    fn save_ledger(&mut self, ledger: &IncompatibleLedger) -> io::Result<()>;

    fn channel(&self) -> Channel;

    /// Load, record, save.
    fn mark_incompatible(&mut self, version: &str, reason: &str) -> io::Result<()> {
        let mut ledger = self.load_ledger();
        ledger.record(version, reason);
        self.save_ledger(&ledger)
    }
}

/// Filesystem-backed port rooted at a device layout.
#[derive(Debug, Clone)]
pub struct FsStatePort {
    layout: DeviceLayout,
}

impl FsStatePort {
    pub fn new(layout: DeviceLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &DeviceLayout {
        &self.layout
    }

    /// Create or remove the development marker.
    pub fn set_channel(&self, channel: Channel) -> io::Result<()> {
        let marker = self.layout.development_marker();
        match channel {
            Channel::Development => fs::write(marker, b""),
            Channel::Production => match fs::remove_file(marker) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            },
        }
    }
}

impl StatePort for FsStatePort {
    fn load_ledger(&self) -> IncompatibleLedger {
        IncompatibleLedger::load(&self.layout.ledger())
    }

    fn save_ledger(&mut self, ledger: &IncompatibleLedger) -> io::Result<()> {
        ledger.save(&self.layout.ledger())
    }

    fn channel(&self) -> Channel {
        if self.layout.development_marker().exists() {
            Channel::Development
        } else {
            Channel::Production
        }
    }
}

/// In-memory port for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStatePort {
    pub ledger: IncompatibleLedger,
    pub channel: Channel,
    pub saves: usize,
}

impl MemoryStatePort {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            ..Default::default()
        }
    }

    pub fn with_ledger(channel: Channel, ledger: IncompatibleLedger) -> Self {
        Self {
            ledger,
            channel,
            saves: 0,
        }
    }
}

impl StatePort for MemoryStatePort {
    fn load_ledger(&self) -> IncompatibleLedger {
        self.ledger.clone()
    }

    fn save_ledger(&mut self, ledger: &IncompatibleLedger) -> io::Result<()> {
        self.ledger = ledger.clone();
        self.saves += 1;
        Ok(())
    }

    fn channel(&self) -> Channel {
        self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fs_channel_marker() {
        let tmp = TempDir::new().unwrap();
        let port = FsStatePort::new(DeviceLayout::new(tmp.path()));
        assert_eq!(port.channel(), Channel::Production);

        port.set_channel(Channel::Development).unwrap();
        assert_eq!(port.channel(), Channel::Development);

        port.set_channel(Channel::Production).unwrap();
        port.set_channel(Channel::Production).unwrap();
        assert_eq!(port.channel(), Channel::Production);
    }

    #[test]
    fn test_fs_mark_incompatible_persists() {
        let tmp = TempDir::new().unwrap();
        let mut port = FsStatePort::new(DeviceLayout::new(tmp.path()));
        port.mark_incompatible("0.9.0", "bad").unwrap();

        let reread = FsStatePort::new(DeviceLayout::new(tmp.path()));
        assert!(reread.load_ledger().contains("0.9.0"));
    }

    #[test]
    fn test_memory_port() {
        let mut port = MemoryStatePort::new(Channel::Development);
        port.mark_incompatible("1.0.0", "x").unwrap();
        assert!(port.ledger.contains("1.0.0"));
        assert_eq!(port.saves, 1);
    }
}
