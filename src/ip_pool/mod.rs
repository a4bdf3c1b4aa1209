//! Pool of pre-reserved public addresses handed out to new instances.
//!
//! The pool is filled from the provider's reserved addresses that match a
//! label selector, sit in the group's location and are not yet assigned.
//! Each address is handed out at most once per refresh.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::debug;

use crate::provider::{Address, AddressFamily, LabelSelector, Provider, ProviderError};

/// Errors raised by [`IpPool`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PoolError {
    /// [`IpPool::refresh`] has not populated the pool yet.
    #[error("ip pool is not initialized")]
    NotInitialized,
    /// Every address of the requested family has been handed out.
    #[error("ip pool is empty ({family})")]
    Exhausted {
        /// Family that ran out.
        family: AddressFamily,
    },
    /// The provider listing failed.
    #[error("could not refresh ip pool: {0}")]
    Refresh(#[source] ProviderError),
}

#[derive(Debug, Default)]
struct Queues {
    ipv4: Option<VecDeque<Address>>,
    ipv6: Option<VecDeque<Address>>,
}

impl Queues {
    const fn family(&mut self, family: AddressFamily) -> &mut Option<VecDeque<Address>> {
        match family {
            AddressFamily::Ipv4 => &mut self.ipv4,
            AddressFamily::Ipv6 => &mut self.ipv6,
        }
    }
}

/// Address allocator for one location and selector.
#[derive(Debug)]
pub struct IpPool {
    location: String,
    selector: LabelSelector,
    queues: Mutex<Queues>,
}

impl IpPool {
    /// Creates an empty, uninitialised pool.
    #[must_use]
    pub fn new(location: impl Into<String>, selector: LabelSelector) -> Self {
        Self {
            location: location.into(),
            selector,
            queues: Mutex::new(Queues::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Queues> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the pool content with the currently unassigned addresses.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Refresh`] when the provider listing fails. The
    /// previous content is kept in that case.
    pub async fn refresh(&self, provider: &dyn Provider) -> Result<(), PoolError> {
        let addresses = provider
            .list_addresses(&self.selector)
            .await
            .map_err(PoolError::Refresh)?;

        let mut ipv4 = VecDeque::with_capacity(addresses.len());
        let mut ipv6 = VecDeque::with_capacity(addresses.len());
        for address in addresses {
            if address.location != self.location || address.assignee.is_some() {
                continue;
            }
            match address.family {
                AddressFamily::Ipv4 => ipv4.push_back(address),
                AddressFamily::Ipv6 => ipv6.push_back(address),
            }
        }
        ipv4.shrink_to_fit();
        ipv6.shrink_to_fit();
        debug!(
            ipv4 = ipv4.len(),
            ipv6 = ipv6.len(),
            selector = %self.selector,
            "refreshed ip pool"
        );

        let mut queues = self.lock();
        queues.ipv4 = Some(ipv4);
        queues.ipv6 = Some(ipv6);
        Ok(())
    }

    fn next(&self, family: AddressFamily) -> Result<Address, PoolError> {
        let mut queues = self.lock();
        let queue = queues
            .family(family)
            .as_mut()
            .ok_or(PoolError::NotInitialized)?;
        queue.pop_front().ok_or(PoolError::Exhausted { family })
    }

    /// Removes and returns the first free IPv4 address.
    ///
    /// # Errors
    ///
    /// [`PoolError::NotInitialized`] before the first refresh,
    /// [`PoolError::Exhausted`] when no IPv4 address is left.
    pub fn next_ipv4(&self) -> Result<Address, PoolError> {
        self.next(AddressFamily::Ipv4)
    }

    /// Removes and returns the first free IPv6 address.
    ///
    /// # Errors
    ///
    /// [`PoolError::NotInitialized`] before the first refresh,
    /// [`PoolError::Exhausted`] when no IPv6 address is left.
    pub fn next_ipv6(&self) -> Result<Address, PoolError> {
        self.next(AddressFamily::Ipv6)
    }

    /// Puts an address back at the front of its queue.
    ///
    /// Ignored before the first refresh: the next refresh lists it again.
    pub fn release(&self, address: Address) {
        let mut queues = self.lock();
        let family = address.family;
        if let Some(queue) = queues.family(family).as_mut()
            && !queue.iter().any(|queued| queued.id == address.id)
        {
            debug!(address = %address.id, %family, "released address to ip pool");
            queue.push_front(address);
        }
    }

    /// Number of IPv4 addresses left.
    #[must_use]
    pub fn size_ipv4(&self) -> usize {
        self.lock().ipv4.as_ref().map_or(0, VecDeque::len)
    }

    /// Number of IPv6 addresses left.
    #[must_use]
    pub fn size_ipv6(&self) -> usize {
        self.lock().ipv6.as_ref().map_or(0, VecDeque::len)
    }
}
