// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Off-channel management frame contexts.
//!
//! A tx context lives in exactly one place: unqueued while it is being sent
//! on the current channel, the wait-for-RoC queue while its listen period
//! is pending, or the wait-for-ack queue once handed to the mgmt layer.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use serde::{Serialize, Serializer};

use crate::arena::{Arena, Handle};
use crate::controller::timer::TimerTicket;
use crate::frame::FrameInfo;
use crate::radio::{Channel, VdevId};
use crate::roc::RocCookie;

/// Opaque identifier of a management tx context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxCookie(pub(crate) Handle);

impl TxCookie {
    pub fn to_u64(self) -> u64 {
        self.0.to_u64()
    }

    pub fn from_u64(raw: u64) -> Self {
        Self(Handle::from_u64(raw))
    }
}

impl fmt::Display for TxCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for TxCookie {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.to_u64())
    }
}

#[derive(Debug, Clone)]
pub struct TxContext {
    pub vdev_id: VdevId,
    pub chan: Channel,
    pub frame: Bytes,
    pub frame_info: FrameInfo,
    pub off_chan: bool,
    pub no_cck: bool,
    pub no_ack: bool,
    /// How long the radio should stay on channel for this exchange.
    pub wait: Duration,
    pub roc: Option<RocCookie>,
    pub ack_timer: Option<TimerTicket>,
}

impl fmt::Display for TxContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vdev:{} chan:{} len:{} {} off_chan:{} no_cck:{} no_ack:{} wait:{:?}",
            self.vdev_id,
            self.chan,
            self.frame.len(),
            self.frame_info,
            self.off_chan,
            self.no_cck,
            self.no_ack,
            self.wait,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxLocation {
    Unqueued,
    WaitRoc,
    WaitAck,
}

#[derive(Debug, Default)]
pub struct TxQueues {
    contexts: Arena<TxContext>,
    wait_roc: VecDeque<TxCookie>,
    wait_ack: VecDeque<TxCookie>,
}

impl TxQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a context outside both queues.
    pub fn insert(&mut self, ctx: TxContext) -> TxCookie {
        TxCookie(self.contexts.insert(ctx))
    }

    pub fn get(&self, cookie: TxCookie) -> Option<&TxContext> {
        self.contexts.get(cookie.0)
    }

    pub fn get_mut(&mut self, cookie: TxCookie) -> Option<&mut TxContext> {
        self.contexts.get_mut(cookie.0)
    }

    pub fn locate(&self, cookie: TxCookie) -> Option<TxLocation> {
        if !self.contexts.contains(cookie.0) {
            return None;
        }
        if self.wait_roc.contains(&cookie) {
            Some(TxLocation::WaitRoc)
        } else if self.wait_ack.contains(&cookie) {
            Some(TxLocation::WaitAck)
        } else {
            Some(TxLocation::Unqueued)
        }
    }

    pub fn park_for_roc(&mut self, cookie: TxCookie) {
        self.unlink(cookie);
        self.wait_roc.push_back(cookie);
    }

    pub fn move_to_ack(&mut self, cookie: TxCookie) {
        self.unlink(cookie);
        self.wait_ack.push_back(cookie);
    }

    /// Find the frame paired with a RoC context.
    pub fn find_by_roc(&self, roc: RocCookie) -> Option<(TxCookie, TxLocation)> {
        self.wait_roc
            .iter()
            .map(|c| (*c, TxLocation::WaitRoc))
            .chain(self.wait_ack.iter().map(|c| (*c, TxLocation::WaitAck)))
            .find(|(c, _)| self.get(*c).and_then(|ctx| ctx.roc) == Some(roc))
    }

    pub fn remove(&mut self, cookie: TxCookie) -> Option<TxContext> {
        self.unlink(cookie);
        self.contexts.remove(cookie.0)
    }

    /// Remove every queued context, wait-for-RoC entries first.
    pub fn drain(&mut self) -> Vec<(TxCookie, TxContext)> {
        let cookies: Vec<TxCookie> = self
            .wait_roc
            .drain(..)
            .chain(self.wait_ack.drain(..))
            .collect();
        cookies
            .into_iter()
            .filter_map(|c| self.contexts.remove(c.0).map(|ctx| (c, ctx)))
            .collect()
    }

    pub fn wait_roc_len(&self) -> usize {
        self.wait_roc.len()
    }

    pub fn wait_ack_len(&self) -> usize {
        self.wait_ack.len()
    }

    fn unlink(&mut self, cookie: TxCookie) {
        self.wait_roc.retain(|c| *c != cookie);
        self.wait_ack.retain(|c| *c != cookie);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::tests::public_action_frame;

    fn tx_ctx() -> TxContext {
        let frame = public_action_frame(0);
        TxContext {
            vdev_id: 0,
            chan: Channel::new(1).unwrap(),
            frame_info: FrameInfo::parse(&frame).unwrap(),
            frame: Bytes::from(frame),
            off_chan: true,
            no_cck: false,
            no_ack: false,
            wait: Duration::from_millis(100),
            roc: None,
            ack_timer: None,
        }
    }

    #[test]
    fn test_location_moves() {
        let mut queues = TxQueues::new();
        let cookie = queues.insert(tx_ctx());
        assert_eq!(queues.locate(cookie), Some(TxLocation::Unqueued));

        queues.park_for_roc(cookie);
        assert_eq!(queues.locate(cookie), Some(TxLocation::WaitRoc));
        assert_eq!(queues.wait_roc_len(), 1);

        queues.move_to_ack(cookie);
        assert_eq!(queues.locate(cookie), Some(TxLocation::WaitAck));
        assert_eq!(queues.wait_roc_len(), 0);
        assert_eq!(queues.wait_ack_len(), 1);

        assert!(queues.remove(cookie).is_some());
        assert_eq!(queues.locate(cookie), None);
        assert_eq!(queues.wait_ack_len(), 0);
    }

    #[test]
    fn test_find_by_roc() {
        let mut queues = TxQueues::new();
        let roc = RocCookie::from_u64(0x1_0000_0003);
        let mut ctx = tx_ctx();
        ctx.roc = Some(roc);
        let cookie = queues.insert(ctx);
        assert_eq!(queues.find_by_roc(roc), None);
        queues.park_for_roc(cookie);
        assert_eq!(queues.find_by_roc(roc), Some((cookie, TxLocation::WaitRoc)));
    }

    #[test]
    fn test_drain_empties_both_queues() {
        let mut queues = TxQueues::new();
        let a = queues.insert(tx_ctx());
        let b = queues.insert(tx_ctx());
        queues.move_to_ack(a);
        queues.park_for_roc(b);
        let drained: Vec<TxCookie> = queues.drain().into_iter().map(|(c, _)| c).collect();
        assert_eq!(drained, vec![b, a]);
        assert_eq!(queues.wait_roc_len() + queues.wait_ack_len(), 0);
        assert!(queues.get(a).is_none());
    }
}
