//! Tenant isolation and quota admission.
//!
//! Every write path goes through [`TenantGuard`]: `admit` (and, for
//! streams of unknown length, repeated `reserve`) claims quota headroom
//! before bytes are written, the catalog commit re-checks inside its own
//! transaction, and the returned [`AdmitToken`] releases its reservation
//! on every exit path - explicitly via [`TenantGuard::commit`] /
//! [`TenantGuard::release`], or implicitly on drop, so a panicking or
//! cancelled ingest can never strand quota.
//!
//! Reservations live in memory (they only need to cover in-flight writes
//! on this process); authoritative usage lives in the `tenant` table and
//! moves only inside catalog commit transactions. Two admitted writers can
//! therefore never jointly exceed quota: each holds a reservation the
//! other's admission check sees.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

use crate::catalog::Catalog;
use crate::error::StoreError;

/// Proof of tenant identity for read paths; injected into every catalog
/// and payload query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope {
    tenant_id: String,
}

impl TenantScope {
    pub(crate) fn new(tenant_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Construct a scope without consulting the guard. Test helper only.
    #[doc(hidden)]
    pub fn for_tests(tenant_id: &str) -> Self {
        Self::new(tenant_id)
    }
}

/// Capability returned by admission; carries the in-memory reservation.
#[derive(Debug)]
pub struct AdmitToken {
    tenant: String,
    reserved: u64,
    inflight: Arc<DashMap<String, u64>>,
    settled: bool,
}

impl AdmitToken {
    pub fn tenant_id(&self) -> &str {
        &self.tenant
    }

    pub fn reserved(&self) -> u64 {
        self.reserved
    }

    fn settle(&mut self) {
        if self.settled {
            return;
        }
        self.settled = true;
        if let Some(mut entry) = self.inflight.get_mut(&self.tenant) {
            *entry = entry.saturating_sub(self.reserved);
        }
    }
}

impl Drop for AdmitToken {
    fn drop(&mut self) {
        if !self.settled {
            warn!(tenant_id = %self.tenant, reserved = self.reserved, "admit_token_dropped_unsettled");
            self.settle();
        }
    }
}

/// Per-tenant quota and isolation guard.
pub struct TenantGuard {
    catalog: Catalog,
    inflight: Arc<DashMap<String, u64>>,
    admission: DashMap<String, Arc<std::sync::Mutex<()>>>,
}

impl TenantGuard {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            inflight: Arc::new(DashMap::new()),
            admission: DashMap::new(),
        }
    }

    fn admission_lock(&self, tenant: &str) -> Arc<std::sync::Mutex<()>> {
        self.admission
            .entry(tenant.to_string())
            .or_insert_with(|| Arc::new(std::sync::Mutex::new(())))
            .clone()
    }

    fn headroom_check(&self, tenant: &str, delta: u64) -> Result<(), StoreError> {
        let record = self
            .catalog
            .tenant(tenant)?
            .ok_or_else(|| StoreError::UnknownTenant(tenant.to_string()))?;
        if !record.active {
            return Err(StoreError::Inactive(tenant.to_string()));
        }
        let inflight = self.inflight.get(tenant).map(|e| *e).unwrap_or(0);
        let committed = record.usage_bytes.saturating_add(inflight);
        if committed.saturating_add(delta) > record.quota_bytes {
            return Err(StoreError::QuotaExceeded {
                tenant: tenant.to_string(),
                usage: committed,
                requested: delta,
                quota: record.quota_bytes,
            });
        }
        Ok(())
    }

    /// Admit a write of `expected_bytes` (0 for streams of unknown
    /// length; grow the claim later with [`TenantGuard::reserve`]).
    pub fn admit(&self, tenant: &str, expected_bytes: u64) -> Result<AdmitToken, StoreError> {
        let lock = self.admission_lock(tenant);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());

        self.headroom_check(tenant, expected_bytes)?;
        *self.inflight.entry(tenant.to_string()).or_insert(0) += expected_bytes;
        Ok(AdmitToken {
            tenant: tenant.to_string(),
            reserved: expected_bytes,
            inflight: Arc::clone(&self.inflight),
            settled: false,
        })
    }

    /// Grow a token's reservation mid-stream. Fails without mutating when
    /// the extra bytes would cross the quota, which is exactly the abort
    /// signal the streaming ingest wants.
    pub fn reserve(&self, token: &mut AdmitToken, delta: u64) -> Result<(), StoreError> {
        let lock = self.admission_lock(&token.tenant);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());

        self.headroom_check(&token.tenant, delta)?;
        *self.inflight.entry(token.tenant.clone()).or_insert(0) += delta;
        token.reserved += delta;
        Ok(())
    }

    /// Settle a token after the catalog commit landed. The usage write
    /// itself happened inside the commit transaction (with its own quota
    /// re-check); this only retires the in-memory reservation.
    pub fn commit(&self, mut token: AdmitToken) {
        token.settle();
    }

    /// Retire a token without committing anything.
    pub fn release(&self, mut token: AdmitToken) {
        token.settle();
    }

    /// Tenant identity predicate for read paths.
    pub fn scope(&self, tenant: &str) -> Result<TenantScope, StoreError> {
        match self.catalog.tenant(tenant)? {
            Some(_) => Ok(TenantScope::new(tenant)),
            None => Err(StoreError::UnknownTenant(tenant.to_string())),
        }
    }

    /// Currently reserved (in-flight) bytes for a tenant.
    pub fn inflight_bytes(&self, tenant: &str) -> u64 {
        self.inflight.get(tenant).map(|e| *e).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard_with_tenant(quota: u64) -> TenantGuard {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.upsert_tenant("t1", quota).unwrap();
        TenantGuard::new(catalog)
    }

    #[test]
    fn admit_within_quota() {
        let guard = guard_with_tenant(100);
        let token = guard.admit("t1", 40).unwrap();
        assert_eq!(guard.inflight_bytes("t1"), 40);
        guard.commit(token);
        assert_eq!(guard.inflight_bytes("t1"), 0);
    }

    #[test]
    fn admit_rejects_over_quota() {
        let guard = guard_with_tenant(100);
        let err = guard.admit("t1", 101).unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { .. }));
    }

    #[test]
    fn concurrent_admissions_cannot_jointly_exceed() {
        let guard = guard_with_tenant(100);
        let _first = guard.admit("t1", 60).unwrap();
        let err = guard.admit("t1", 60).unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { .. }));
    }

    #[test]
    fn release_returns_headroom() {
        let guard = guard_with_tenant(100);
        let token = guard.admit("t1", 80).unwrap();
        guard.release(token);
        assert!(guard.admit("t1", 80).is_ok());
    }

    #[test]
    fn dropped_token_releases_itself() {
        let guard = guard_with_tenant(100);
        {
            let _token = guard.admit("t1", 80).unwrap();
        }
        assert_eq!(guard.inflight_bytes("t1"), 0);
    }

    #[test]
    fn streaming_reservation_grows_until_quota() {
        let guard = guard_with_tenant(100);
        let mut token = guard.admit("t1", 0).unwrap();
        guard.reserve(&mut token, 60).unwrap();
        guard.reserve(&mut token, 40).unwrap();
        let err = guard.reserve(&mut token, 1).unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { .. }));
        assert_eq!(token.reserved(), 100);
        guard.release(token);
        assert_eq!(guard.inflight_bytes("t1"), 0);
    }

    #[test]
    fn unknown_tenant_rejected() {
        let guard = guard_with_tenant(100);
        assert!(matches!(
            guard.admit("nobody", 1),
            Err(StoreError::UnknownTenant(_))
        ));
        assert!(matches!(
            guard.scope("nobody"),
            Err(StoreError::UnknownTenant(_))
        ));
    }

    #[test]
    fn inactive_tenant_cannot_write() {
        let guard = guard_with_tenant(100);
        guard.catalog.set_tenant_active("t1", false).unwrap();
        assert!(matches!(guard.admit("t1", 1), Err(StoreError::Inactive(_))));
        // Reads keep working for forensics.
        assert!(guard.scope("t1").is_ok());
    }
}
