//! Ordered packet queues between pipeline stages

use super::Packet;
use crate::error::{Error, Result};
use std::collections::VecDeque;

/// FIFO of owned packets.
///
/// A queue may carry a byte budget; [`PacketQueue::remaining`] then reports how
/// many payload bytes can still be buffered before the owner must drain it.
#[derive(Debug, Default)]
pub struct PacketQueue {
    packets: VecDeque<Packet>,
    bytes: usize,
    budget: Option<usize>,
}

impl PacketQueue {
    /// Create an unbounded queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue that tracks a byte budget
    pub fn with_budget(budget: usize) -> Self {
        PacketQueue {
            budget: Some(budget),
            ..Self::default()
        }
    }

    /// Append a packet at the back
    pub fn push(&mut self, packet: Packet) -> Result<()> {
        self.packets
            .try_reserve(1)
            .map_err(|e| Error::out_of_memory(format!("packet queue: {}", e)))?;
        self.bytes += packet.size();
        self.packets.push_back(packet);
        Ok(())
    }

    /// Remove the oldest packet
    pub fn pop_front(&mut self) -> Result<Packet> {
        let packet = self.packets.pop_front().ok_or(Error::Empty)?;
        self.bytes -= packet.size();
        Ok(packet)
    }

    /// The oldest packet
    pub fn front(&self) -> Option<&Packet> {
        self.packets.front()
    }

    /// Mutable access to the oldest packet
    pub fn front_mut(&mut self) -> Option<&mut Packet> {
        self.packets.front_mut()
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Packet> {
        self.packets.iter()
    }

    /// Iterate mutably from oldest to newest.
    ///
    /// Payload sizes must not change through this iterator.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Packet> {
        self.packets.iter_mut()
    }

    /// Number of queued packets
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Payload bytes currently queued
    pub fn total_size(&self) -> usize {
        self.bytes
    }

    /// Bytes left in the budget; negative once exceeded, `i64::MAX` if unbounded
    pub fn remaining(&self) -> i64 {
        match self.budget {
            Some(budget) => budget as i64 - self.bytes as i64,
            None => i64::MAX,
        }
    }

    /// Smallest known byte position among queued packets
    pub fn min_position(&self) -> Option<i64> {
        self.packets
            .iter()
            .map(|p| p.position)
            .filter(|&pos| pos >= 0)
            .min()
    }

    /// Drop every queued packet. Flushing an empty queue is a no-op.
    pub fn flush(&mut self) {
        self.packets.clear();
        self.bytes = 0;
    }
}
