//! # Registration: claim, hold and release one key.
//!
//! The building blocks ([`connect`](Registration::connect),
//! [`claim`](Registration::claim), [`hold`](Registration::hold),
//! [`release`](Registration::release)) are public so that the election can
//! react between claim and hold. [`Registration::run`] chains them in a
//! detached task and reports the outcome through the bus and a liveness token.
//!
//! ## Rules
//! - Keepalive failing with "lease not found" ends the hold ([`RegistrationError::LeaseLost`]).
//!   Other keepalive failures are reported and retried on the next tick.
//! - A fencing read that finds no key, or a key with another creation revision,
//!   ends the hold. A failed fencing read ends it too.
//! - Every path that granted a lease revokes it before the liveness token fires,
//!   including a panic inside the hold.

use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::RegistrationConfig;
use crate::error::{RegistrationError, StoreError, panic_message};
use crate::events::{Bus, Event, EventKind};
use crate::registration::lease::RegistrationLease;
use crate::store::{Connect, LeaseId, PutOutcome, StoreRef};

/// Exclusive ownership of one key, kept alive by a lease.
pub struct Registration {
    connector: Arc<dyn Connect>,
    key: String,
    payload: Vec<u8>,
    cfg: RegistrationConfig,
    bus: Bus,
    store: Mutex<Option<StoreRef>>,
    liveness: Mutex<CancellationToken>,
}

impl Registration {
    /// Creates a registration of `key` carrying `payload`.
    pub fn new(
        connector: Arc<dyn Connect>,
        key: impl Into<String>,
        payload: Vec<u8>,
        cfg: RegistrationConfig,
        bus: Bus,
    ) -> Self {
        let idle = CancellationToken::new();
        idle.cancel();
        Self {
            connector,
            key: key.into(),
            payload,
            cfg,
            bus,
            store: Mutex::new(None),
            liveness: Mutex::new(idle),
        }
    }

    /// Same as [`Registration::new`] with a JSON-encoded payload.
    pub fn json<T: Serialize>(
        connector: Arc<dyn Connect>,
        key: impl Into<String>,
        payload: &T,
        cfg: RegistrationConfig,
        bus: Bus,
    ) -> Result<Self, StoreError> {
        let payload = serde_json::to_vec(payload)?;
        Ok(Self::new(connector, key, payload, cfg, bus))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Liveness of the latest run.
    ///
    /// Cancelled once that run ended; already cancelled before the first run.
    pub fn context(&self) -> CancellationToken {
        self.liveness.lock().clone()
    }

    /// Opens a fresh store connection and makes it the current one.
    pub async fn connect(&self) -> Result<StoreRef, RegistrationError> {
        let store = self
            .connector
            .connect()
            .await
            .map_err(RegistrationError::Connect)?;
        *self.store.lock() = Some(Arc::clone(&store));
        Ok(store)
    }

    /// Grants a lease and creates the key bound to it, only if the key is absent.
    ///
    /// When the key already exists the fresh lease is revoked and
    /// [`RegistrationError::AlreadyClaimed`] is returned; the existing value is untouched.
    pub async fn claim(&self, store: &StoreRef) -> Result<RegistrationLease, RegistrationError> {
        let lease_id = store.grant_lease(self.cfg.ttl_secs).await?;
        let outcome = match store
            .put_if_absent(&self.key, self.payload.clone(), lease_id)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.revoke(store, lease_id).await;
                return Err(e.into());
            }
        };

        match outcome {
            PutOutcome::Created { revision } => {
                self.bus.publish(
                    Event::new(EventKind::RegistrationClaimed)
                        .with_component("registration")
                        .with_key(self.key.as_str())
                        .with_revision(revision),
                );
                Ok(RegistrationLease {
                    key: self.key.clone(),
                    payload: self.payload.clone(),
                    ttl_secs: self.cfg.ttl_secs,
                    lease_id,
                    create_revision: revision,
                })
            }
            PutOutcome::Exists { create_revision } => {
                self.revoke(store, lease_id).await;
                self.bus.publish(
                    Event::new(EventKind::RegistrationRejected)
                        .with_component("registration")
                        .with_key(self.key.as_str())
                        .with_revision(create_revision),
                );
                Err(RegistrationError::AlreadyClaimed {
                    key: self.key.clone(),
                    create_revision,
                })
            }
        }
    }

    /// Keeps `lease` alive and fences it until `ctx` is cancelled or ownership is lost.
    ///
    /// Returns `Ok(())` only on cancellation. Does not revoke the lease.
    pub async fn hold(
        &self,
        store: &StoreRef,
        lease: &RegistrationLease,
        ctx: &CancellationToken,
    ) -> Result<(), RegistrationError> {
        let now = Instant::now();
        let mut keepalive = tokio::time::interval_at(
            now + self.cfg.keepalive_interval,
            self.cfg.keepalive_interval,
        );
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut fencing = tokio::time::interval_at(
            now + self.cfg.fencing_interval,
            self.cfg.fencing_interval,
        );
        fencing.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Ok(()),
                _ = keepalive.tick() => {
                    if let Err(e) = store.keep_alive_once(lease.lease_id).await {
                        if e.is_lease_not_found() {
                            return Err(RegistrationError::LeaseLost(e));
                        }
                        self.bus.publish(
                            Event::new(EventKind::KeepAliveFailed)
                                .with_component("registration")
                                .with_key(lease.key.as_str())
                                .with_reason(e.to_string()),
                        );
                    }
                }
                _ = fencing.tick() => self.fence(store, lease).await?,
            }
        }
    }

    async fn fence(
        &self,
        store: &StoreRef,
        lease: &RegistrationLease,
    ) -> Result<(), RegistrationError> {
        match store.get(&lease.key).await? {
            None => Err(RegistrationError::KeyVanished {
                key: lease.key.clone(),
            }),
            Some(kv) if kv.create_revision != lease.create_revision => {
                Err(RegistrationError::Fenced {
                    key: lease.key.clone(),
                    expected: lease.create_revision,
                    found: kv.create_revision,
                })
            }
            Some(_) => Ok(()),
        }
    }

    /// Best-effort revoke of `lease`.
    pub async fn release(&self, store: &StoreRef, lease: &RegistrationLease) {
        self.revoke(store, lease.lease_id).await;
    }

    async fn revoke(&self, store: &StoreRef, lease_id: LeaseId) {
        let mut ev = Event::new(EventKind::LeaseRevoked)
            .with_component("registration")
            .with_key(self.key.as_str());
        if let Err(e) = store.revoke_lease(lease_id).await {
            ev = ev.with_reason(e.to_string());
        }
        self.bus.publish(ev);
    }

    /// [`hold`](Registration::hold) followed by [`release`](Registration::release).
    ///
    /// The lease is released even when the hold panics; the panic is then resumed.
    pub async fn hold_then_release(
        &self,
        store: &StoreRef,
        lease: &RegistrationLease,
        ctx: &CancellationToken,
    ) -> Result<(), RegistrationError> {
        let held = std::panic::AssertUnwindSafe(self.hold(store, lease, ctx))
            .catch_unwind()
            .await;
        self.release(store, lease).await;
        match held {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// One full run: connect, claim, hold until `ctx` is cancelled or ownership is lost, release.
    pub async fn run_once(&self, ctx: &CancellationToken) -> Result<(), RegistrationError> {
        let store = self.connect().await?;
        let lease = self.claim(&store).await?;
        self.hold_then_release(&store, &lease, ctx).await
    }

    /// Starts a detached run under `parent` and returns its liveness token.
    ///
    /// A previous run of this registration is ended first. Failures and panics
    /// are reported on the bus; the returned token is cancelled when the run ends
    /// for any reason.
    pub fn run(self: &Arc<Self>, parent: &CancellationToken) -> CancellationToken {
        let ctx = parent.child_token();
        let previous = std::mem::replace(&mut *self.liveness.lock(), ctx.clone());
        previous.cancel();

        let this = Arc::clone(self);
        let liveness = ctx.clone();
        tokio::spawn(async move {
            let outcome = std::panic::AssertUnwindSafe(this.run_once(&ctx))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => this.bus.publish(
                    Event::new(EventKind::RegistrationLost)
                        .with_component("registration")
                        .with_key(this.key.as_str())
                        .with_reason(e.to_string()),
                ),
                Err(panic) => this.bus.publish(
                    Event::new(EventKind::Panicked)
                        .with_component("registration")
                        .with_key(this.key.as_str())
                        .with_reason(panic_message(&*panic)),
                ),
            }
            ctx.cancel();
        });
        liveness
    }
}
