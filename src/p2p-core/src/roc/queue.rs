// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Insertion-ordered RoC admission queue.
//!
//! The queue owns every RoC context of one radio. At most one entry is
//! non-idle at a time and, when present, it is the oldest entry.

use std::collections::VecDeque;

use crate::arena::Arena;
use crate::error::{P2pError, P2pResult};
use crate::tx::TxCookie;

use super::context::{RocContext, RocCookie};

#[derive(Debug)]
pub struct RocQueue {
    contexts: Arena<RocContext>,
    order: VecDeque<RocCookie>,
    capacity: usize,
}

impl RocQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            contexts: Arena::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Append a context. Fails without side effects when the queue is full.
    pub fn push_back(&mut self, ctx: RocContext) -> P2pResult<RocCookie> {
        if self.order.len() >= self.capacity {
            return Err(P2pError::exhausted(format!(
                "roc queue full ({} entries)",
                self.capacity
            )));
        }
        let cookie = RocCookie(self.contexts.insert(ctx));
        self.order.push_back(cookie);
        Ok(cookie)
    }

    pub fn get(&self, cookie: RocCookie) -> Option<&RocContext> {
        self.contexts.get(cookie.0)
    }

    pub fn get_mut(&mut self, cookie: RocCookie) -> Option<&mut RocContext> {
        self.contexts.get_mut(cookie.0)
    }

    pub fn contains(&self, cookie: RocCookie) -> bool {
        self.contexts.contains(cookie.0)
    }

    pub fn remove(&mut self, cookie: RocCookie) -> Option<RocContext> {
        let ctx = self.contexts.remove(cookie.0)?;
        self.order.retain(|c| *c != cookie);
        Some(ctx)
    }

    pub fn front(&self) -> Option<RocCookie> {
        self.order.front().copied()
    }

    /// The single non-idle context, if any.
    pub fn current(&self) -> Option<RocCookie> {
        self.iter()
            .find(|(_, ctx)| !ctx.is_idle())
            .map(|(cookie, _)| cookie)
    }

    pub fn find_by_tx(&self, tx: TxCookie) -> Option<RocCookie> {
        self.iter()
            .find(|(_, ctx)| ctx.tx == Some(tx))
            .map(|(cookie, _)| cookie)
    }

    /// Cookies of all entries matching `pred`, oldest first.
    pub fn select(&self, mut pred: impl FnMut(&RocContext) -> bool) -> Vec<RocCookie> {
        self.iter()
            .filter(|(_, ctx)| pred(ctx))
            .map(|(cookie, _)| cookie)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RocCookie, &RocContext)> + '_ {
        self.order
            .iter()
            .filter_map(|cookie| self.contexts.get(cookie.0).map(|ctx| (*cookie, ctx)))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::radio::{Channel, PhyMode};
    use crate::roc::RocState;

    fn ctx(vdev_id: u8) -> RocContext {
        RocContext::user_requested(
            vdev_id,
            Channel::new(6).unwrap(),
            PhyMode::Auto,
            Duration::from_millis(100),
        )
    }

    #[test]
    fn test_fifo_order_and_current() {
        let mut queue = RocQueue::new(4);
        let a = queue.push_back(ctx(0)).unwrap();
        let b = queue.push_back(ctx(1)).unwrap();
        assert_eq!(queue.front(), Some(a));
        assert_eq!(queue.current(), None);

        queue.get_mut(a).unwrap().state = RocState::Requested;
        assert_eq!(queue.current(), Some(a));

        queue.remove(a);
        assert_eq!(queue.front(), Some(b));
        assert_eq!(queue.current(), None);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_capacity_is_enforced_without_side_effects() {
        let mut queue = RocQueue::new(2);
        queue.push_back(ctx(0)).unwrap();
        queue.push_back(ctx(0)).unwrap();
        let err = queue.push_back(ctx(0)).unwrap_err();
        assert!(matches!(err, P2pError::ResourceExhausted(_)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_removed_cookie_is_not_found() {
        let mut queue = RocQueue::new(4);
        let a = queue.push_back(ctx(0)).unwrap();
        assert!(queue.remove(a).is_some());
        assert!(queue.get(a).is_none());
        assert!(queue.remove(a).is_none());
        let b = queue.push_back(ctx(0)).unwrap();
        assert_ne!(a, b);
        assert!(!queue.contains(a));
    }

    #[test]
    fn test_select_filters_by_vdev() {
        let mut queue = RocQueue::new(4);
        let a = queue.push_back(ctx(0)).unwrap();
        queue.push_back(ctx(1)).unwrap();
        let c = queue.push_back(ctx(0)).unwrap();
        assert_eq!(queue.select(|ctx| ctx.vdev_id == 0), vec![a, c]);
    }
}
