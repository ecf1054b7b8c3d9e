//! Command and snapshot queues between the BMS task and the supervisor.

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::channel::{Channel, Receiver, Sender};

use crate::config::{COMMAND_QUEUE_DEPTH, SNAPSHOT_QUEUE_DEPTH};
use crate::types::{BmsSnapshot, MainToBmsCommand};

/// Both queues, meant to live in a `static`.
pub struct EventChannels<M: RawMutex, const CMD: usize, const SNAP: usize> {
    commands: Channel<M, MainToBmsCommand, CMD>,
    snapshots: Channel<M, BmsSnapshot, SNAP>,
}

pub type BmsEventChannels = EventChannels<CriticalSectionRawMutex, COMMAND_QUEUE_DEPTH, SNAPSHOT_QUEUE_DEPTH>;

impl<M: RawMutex, const CMD: usize, const SNAP: usize> Default for EventChannels<M, CMD, SNAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, const CMD: usize, const SNAP: usize> EventChannels<M, CMD, SNAP> {
    pub const fn new() -> Self {
        EventChannels {
            commands: Channel::new(),
            snapshots: Channel::new(),
        }
    }

    /// Endpoint for the BMS task: receives commands, sends snapshots.
    pub fn bms(&self) -> BmsEndpoint<'_, M, CMD, SNAP> {
        BmsEndpoint {
            commands: self.commands.receiver(),
            snapshots: self.snapshots.sender(),
        }
    }

    /// Endpoint for the supervisor: sends commands, receives snapshots.
    pub fn supervisor(&self) -> SupervisorEndpoint<'_, M, CMD, SNAP> {
        SupervisorEndpoint {
            commands: self.commands.sender(),
            snapshots: self.snapshots.receiver(),
        }
    }
}

pub struct BmsEndpoint<'a, M: RawMutex, const CMD: usize, const SNAP: usize> {
    commands: Receiver<'a, M, MainToBmsCommand, CMD>,
    snapshots: Sender<'a, M, BmsSnapshot, SNAP>,
}

impl<'a, M: RawMutex, const CMD: usize, const SNAP: usize> BmsEndpoint<'a, M, CMD, SNAP> {
    /// Empties the command queue and returns the newest command, or `retained`
    /// if nothing was queued.
    pub fn drain_commands(&self, retained: MainToBmsCommand) -> MainToBmsCommand {
        let mut latest = retained;
        while let Ok(cmd) = self.commands.try_receive() {
            latest = cmd;
        }
        latest
    }

    /// Queues `snapshot` without waiting. Returns `false` when the queue was
    /// full and the snapshot was dropped.
    pub fn publish(&self, snapshot: BmsSnapshot) -> bool {
        self.snapshots.try_send(snapshot).is_ok()
    }
}

pub struct SupervisorEndpoint<'a, M: RawMutex, const CMD: usize, const SNAP: usize> {
    commands: Sender<'a, M, MainToBmsCommand, CMD>,
    snapshots: Receiver<'a, M, BmsSnapshot, SNAP>,
}

impl<'a, M: RawMutex, const CMD: usize, const SNAP: usize> SupervisorEndpoint<'a, M, CMD, SNAP> {
    /// Returns `false` if the command queue is full.
    pub fn try_send_command(&self, cmd: MainToBmsCommand) -> bool {
        self.commands.try_send(cmd).is_ok()
    }

    pub async fn send_command(&self, cmd: MainToBmsCommand) {
        self.commands.send(cmd).await
    }

    pub fn try_receive_snapshot(&self) -> Option<BmsSnapshot> {
        self.snapshots.try_receive().ok()
    }

    pub async fn receive_snapshot(&self) -> BmsSnapshot {
        self.snapshots.receive().await
    }
}
