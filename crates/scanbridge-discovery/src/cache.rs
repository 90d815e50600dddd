//! The discovery cache.

use std::collections::{HashMap, HashSet};

use crate::params::{PrinterParameters, ScannerParameters};
use crate::unit::{
    DiscoveredUnit, FaxoutUnit, Metadata, PrintUnit, ScanUnit, ServiceType, UnitID,
};
use crate::{DiscoveryError, Result};

/// Capability parameters stored with a unit.
#[derive(Debug, Clone, PartialEq)]
enum UnitParams {
    Printer(PrinterParameters),
    Scanner(ScannerParameters),
}

/// A cached unit.
#[derive(Debug, Clone, Default, PartialEq)]
struct CacheUnit {
    meta: Option<Metadata>,
    params: Option<UnitParams>,
    endpoints: Vec<String>,
}

/// Metadata and parameters that arrived before their unit did.
/// Applied when the unit is eventually added.
#[derive(Debug, Clone, Default, PartialEq)]
struct PendingUnit {
    meta: Option<Metadata>,
    params: Option<UnitParams>,
}

/// The discovery cache: units by ID plus the endpoint index.
///
/// The cache has a single writer (the client worker); readers take
/// snapshots through [`Cache::export`]. Every mutation keeps the two
/// indexes consistent: an endpoint belongs to at most one unit, and
/// deleting a unit unlinks its endpoints atomically.
#[derive(Debug, Default)]
pub(crate) struct Cache {
    units: HashMap<UnitID, CacheUnit>,
    endpoints: HashMap<String, UnitID>,

    // Events that raced ahead of their AddUnit.
    pending: HashMap<UnitID, PendingUnit>,

    // Units removed by DelUnit. Events for these are silently ignored
    // until the next AddUnit.
    tombstones: HashSet<UnitID>,
}

impl Cache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Inserts a unit. Idempotent: adding a known unit is a no-op.
    /// Buffered metadata/parameters for the unit are applied.
    pub(crate) fn add_unit(&mut self, id: UnitID) -> Result<()> {
        self.tombstones.remove(&id);

        if self.units.contains_key(&id) {
            return Ok(());
        }

        let pending = self.pending.remove(&id).unwrap_or_default();
        self.units.insert(
            id,
            CacheUnit {
                meta: pending.meta,
                params: pending.params,
                endpoints: Vec::new(),
            },
        );

        Ok(())
    }

    /// Removes a unit and unlinks all of its endpoints.
    pub(crate) fn del_unit(&mut self, id: &UnitID) -> Result<()> {
        let Some(unit) = self.units.remove(id) else {
            return Err(DiscoveryError::UnknownUnit(id.to_string()));
        };

        for endpoint in &unit.endpoints {
            self.endpoints.remove(endpoint);
        }

        self.pending.remove(id);
        self.tombstones.insert(id.clone());
        Ok(())
    }

    /// Replaces the unit metadata. Repeated updates are allowed; the
    /// last writer wins.
    pub(crate) fn set_metadata(&mut self, id: &UnitID, meta: Metadata) -> Result<()> {
        if self.tombstones.contains(id) {
            return Ok(());
        }

        match self.units.get_mut(id) {
            Some(unit) => unit.meta = Some(meta),
            None => self.pending.entry(id.clone()).or_default().meta = Some(meta),
        }
        Ok(())
    }

    /// Replaces printer parameters of a print unit.
    pub(crate) fn set_printer_parameters(
        &mut self,
        id: &UnitID,
        params: PrinterParameters,
    ) -> Result<()> {
        self.set_params(id, UnitParams::Printer(params))
    }

    /// Replaces scanner parameters of a scan unit.
    pub(crate) fn set_scanner_parameters(
        &mut self,
        id: &UnitID,
        params: ScannerParameters,
    ) -> Result<()> {
        self.set_params(id, UnitParams::Scanner(params))
    }

    /// Replaces printer parameters of a faxout unit.
    pub(crate) fn set_faxout_parameters(
        &mut self,
        id: &UnitID,
        params: PrinterParameters,
    ) -> Result<()> {
        self.set_params(id, UnitParams::Printer(params))
    }

    fn set_params(&mut self, id: &UnitID, params: UnitParams) -> Result<()> {
        if self.tombstones.contains(id) {
            return Ok(());
        }

        match self.units.get_mut(id) {
            Some(unit) => unit.params = Some(params),
            None => self.pending.entry(id.clone()).or_default().params = Some(params),
        }
        Ok(())
    }

    /// Binds an endpoint URL to a unit.
    ///
    /// An endpoint belongs to at most one unit: binding a URL already
    /// owned by a different unit is a conflict.
    pub(crate) fn add_endpoint(&mut self, id: &UnitID, endpoint: &str) -> Result<()> {
        if self.tombstones.contains(id) {
            return Ok(());
        }

        if let Some(owner) = self.endpoints.get(endpoint) {
            if owner != id {
                return Err(DiscoveryError::EndpointConflict {
                    endpoint: endpoint.to_string(),
                });
            }
            return Ok(());
        }

        let Some(unit) = self.units.get_mut(id) else {
            return Err(DiscoveryError::UnknownUnit(id.to_string()));
        };

        unit.endpoints.push(endpoint.to_string());
        self.endpoints.insert(endpoint.to_string(), id.clone());
        Ok(())
    }

    /// Removes an endpoint binding, if it belongs to the unit.
    pub(crate) fn del_endpoint(&mut self, id: &UnitID, endpoint: &str) -> Result<()> {
        if self.tombstones.contains(id) {
            return Ok(());
        }

        match self.endpoints.get(endpoint) {
            Some(owner) if owner == id => {}
            _ => return Ok(()),
        }

        self.endpoints.remove(endpoint);
        if let Some(unit) = self.units.get_mut(id) {
            unit.endpoints.retain(|e| e != endpoint);
        }
        Ok(())
    }

    /// Returns the number of cached units.
    pub(crate) fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true if the cache holds no units.
    pub(crate) fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Returns true if no endpoint bindings remain.
    pub(crate) fn no_endpoints(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Exports a snapshot of the cache.
    ///
    /// A unit projects to [`PrintUnit`], [`ScanUnit`] or
    /// [`FaxoutUnit`] according to its service type and the kind of
    /// parameters stored; units that have not reported capability
    /// parameters yet are not exported.
    pub(crate) fn export(&self) -> Vec<DiscoveredUnit> {
        let mut out: Vec<DiscoveredUnit> = Vec::new();

        for (id, unit) in &self.units {
            let meta = unit.meta.clone().unwrap_or_default();
            let endpoints = unit.endpoints.clone();

            let exported = match (&unit.params, id.svc_type) {
                (Some(UnitParams::Printer(params)), ServiceType::Printer) => {
                    Some(DiscoveredUnit::Print(PrintUnit {
                        id: id.clone(),
                        meta,
                        params: params.clone(),
                        endpoints,
                    }))
                }
                (Some(UnitParams::Printer(params)), ServiceType::Faxout) => {
                    Some(DiscoveredUnit::Faxout(FaxoutUnit {
                        id: id.clone(),
                        meta,
                        params: params.clone(),
                        endpoints,
                    }))
                }
                (Some(UnitParams::Scanner(params)), ServiceType::Scanner) => {
                    Some(DiscoveredUnit::Scan(ScanUnit {
                        id: id.clone(),
                        meta,
                        params: params.clone(),
                        endpoints,
                    }))
                }
                _ => None,
            };

            out.extend(exported);
        }

        // Deterministic snapshot order for callers that print tables.
        out.sort_by(|a, b| {
            (&a.id().device_name, &a.id().queue).cmp(&(&b.id().device_name, &b.id().queue))
        });

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::DiscoveryEvent;
    use crate::unit::{SearchRealm, ServiceProto};

    fn id(name: &str, svc: ServiceType) -> UnitID {
        UnitID {
            device_name: name.to_string(),
            uuid: None,
            queue: String::new(),
            realm: SearchRealm::Dnssd,
            zone: String::new(),
            variant: String::new(),
            svc_type: svc,
            svc_proto: ServiceProto::Ipp,
            serial: String::new(),
        }
    }

    fn apply(cache: &mut Cache, event: &DiscoveryEvent) {
        // Mirrors the client worker dispatch; errors are best-effort
        // ignored exactly as the worker logs-and-continues.
        let _ = match event.clone() {
            DiscoveryEvent::AddUnit { id } => cache.add_unit(id),
            DiscoveryEvent::DelUnit { id } => cache.del_unit(&id),
            DiscoveryEvent::Metadata { id, meta } => cache.set_metadata(&id, meta),
            DiscoveryEvent::PrinterParameters { id, params } => {
                cache.set_printer_parameters(&id, params)
            }
            DiscoveryEvent::ScannerParameters { id, params } => {
                cache.set_scanner_parameters(&id, params)
            }
            DiscoveryEvent::FaxoutParameters { id, params } => {
                cache.set_faxout_parameters(&id, params)
            }
            DiscoveryEvent::AddEndpoint { id, endpoint } => cache.add_endpoint(&id, &endpoint),
            DiscoveryEvent::DelEndpoint { id, endpoint } => cache.del_endpoint(&id, &endpoint),
        };
    }

    #[test]
    fn test_add_unit_is_idempotent() {
        let mut cache = Cache::new();
        let a = id("A", ServiceType::Printer);

        cache.add_unit(a.clone()).unwrap();
        cache
            .set_metadata(&a, Metadata { make_model: "M".into(), ..Metadata::default() })
            .unwrap();
        cache.add_unit(a.clone()).unwrap();

        // The second add did not wipe the metadata.
        let unit = cache.units.get(&a).unwrap();
        assert_eq!(unit.meta.as_ref().unwrap().make_model, "M");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_full_lifecycle_leaves_cache_empty() {
        let mut cache = Cache::new();
        let a = id("A", ServiceType::Printer);

        cache.add_unit(a.clone()).unwrap();
        cache.set_metadata(&a, Metadata::default()).unwrap();
        cache.add_endpoint(&a, "ipp://10.0.0.1/ipp/print").unwrap();
        cache.del_endpoint(&a, "ipp://10.0.0.1/ipp/print").unwrap();
        cache.del_unit(&a).unwrap();

        assert!(cache.is_empty());
        assert!(cache.no_endpoints());
    }

    #[test]
    fn test_del_unit_unlinks_endpoints() {
        let mut cache = Cache::new();
        let a = id("A", ServiceType::Printer);
        let b = id("B", ServiceType::Printer);

        cache.add_unit(a.clone()).unwrap();
        cache.add_endpoint(&a, "ipp://10.0.0.1/").unwrap();
        cache.del_unit(&a).unwrap();

        // The endpoint is free for another unit now.
        cache.add_unit(b.clone()).unwrap();
        cache.add_endpoint(&b, "ipp://10.0.0.1/").unwrap();
        assert_eq!(cache.endpoints.get("ipp://10.0.0.1/"), Some(&b));
    }

    #[test]
    fn test_endpoint_conflict_rejected() {
        let mut cache = Cache::new();
        let a = id("A", ServiceType::Printer);
        let b = id("B", ServiceType::Printer);

        cache.add_unit(a.clone()).unwrap();
        cache.add_unit(b.clone()).unwrap();
        cache.add_endpoint(&a, "ipp://10.0.0.1/").unwrap();

        let err = cache.add_endpoint(&b, "ipp://10.0.0.1/").unwrap_err();
        assert!(matches!(err, DiscoveryError::EndpointConflict { .. }));

        // Re-adding under the owner is fine.
        cache.add_endpoint(&a, "ipp://10.0.0.1/").unwrap();
    }

    #[test]
    fn test_del_endpoint_checks_owner() {
        let mut cache = Cache::new();
        let a = id("A", ServiceType::Printer);
        let b = id("B", ServiceType::Printer);

        cache.add_unit(a.clone()).unwrap();
        cache.add_unit(b.clone()).unwrap();
        cache.add_endpoint(&a, "ipp://10.0.0.1/").unwrap();

        // Deleting under the wrong unit does not unbind.
        cache.del_endpoint(&b, "ipp://10.0.0.1/").unwrap();
        assert_eq!(cache.endpoints.get("ipp://10.0.0.1/"), Some(&a));
    }

    #[test]
    fn test_events_before_add_are_buffered() {
        let mut cache = Cache::new();
        let a = id("A", ServiceType::Printer);

        cache
            .set_metadata(&a, Metadata { make_model: "Early".into(), ..Metadata::default() })
            .unwrap();
        cache
            .set_printer_parameters(&a, PrinterParameters { color: true, ..Default::default() })
            .unwrap();

        assert!(cache.is_empty());

        cache.add_unit(a.clone()).unwrap();
        let unit = cache.units.get(&a).unwrap();
        assert_eq!(unit.meta.as_ref().unwrap().make_model, "Early");
        assert!(matches!(
            unit.params,
            Some(UnitParams::Printer(PrinterParameters { color: true, .. }))
        ));
    }

    #[test]
    fn test_events_after_del_are_ignored_until_next_add() {
        let mut cache = Cache::new();
        let a = id("A", ServiceType::Printer);

        cache.add_unit(a.clone()).unwrap();
        cache.del_unit(&a).unwrap();

        cache
            .set_metadata(&a, Metadata { make_model: "Ghost".into(), ..Metadata::default() })
            .unwrap();

        cache.add_unit(a.clone()).unwrap();
        let unit = cache.units.get(&a).unwrap();
        assert!(unit.meta.is_none(), "post-delete event must not survive");
    }

    #[test]
    fn test_last_parameters_update_wins() {
        let mut cache = Cache::new();
        let a = id("A", ServiceType::Printer);

        cache.add_unit(a.clone()).unwrap();
        cache
            .set_printer_parameters(&a, PrinterParameters { color: false, ..Default::default() })
            .unwrap();
        cache
            .set_printer_parameters(&a, PrinterParameters { color: true, ..Default::default() })
            .unwrap();

        let unit = cache.units.get(&a).unwrap();
        assert!(matches!(
            unit.params,
            Some(UnitParams::Printer(PrinterParameters { color: true, .. }))
        ));
    }

    #[test]
    fn test_export_projections() {
        let mut cache = Cache::new();
        let printer = id("P", ServiceType::Printer);
        let scanner = id("S", ServiceType::Scanner);
        let fax = id("F", ServiceType::Faxout);
        let bare = id("bare", ServiceType::Printer);

        cache.add_unit(printer.clone()).unwrap();
        cache.set_printer_parameters(&printer, PrinterParameters::default()).unwrap();

        cache.add_unit(scanner.clone()).unwrap();
        cache.set_scanner_parameters(&scanner, ScannerParameters::default()).unwrap();

        cache.add_unit(fax.clone()).unwrap();
        cache.set_faxout_parameters(&fax, PrinterParameters::default()).unwrap();

        cache.add_unit(bare.clone()).unwrap();

        let exported = cache.export();
        assert_eq!(exported.len(), 3, "the parameterless unit is not exported");

        assert!(exported.iter().any(|u| matches!(u, DiscoveredUnit::Print(p) if p.id == printer)));
        assert!(exported.iter().any(|u| matches!(u, DiscoveredUnit::Scan(s) if s.id == scanner)));
        assert!(exported.iter().any(|u| matches!(u, DiscoveredUnit::Faxout(f) if f.id == fax)));
    }

    #[test]
    fn test_convergence_under_per_unit_reordering() {
        let a = id("A", ServiceType::Printer);
        let b = id("B", ServiceType::Scanner);

        let meta_a = Metadata { make_model: "Alpha".into(), ..Metadata::default() };
        let params_b = ScannerParameters { adf_duplex: true, ..Default::default() };

        // Two interleavings of the same per-unit event sequences.
        let first = vec![
            DiscoveryEvent::AddUnit { id: a.clone() },
            DiscoveryEvent::AddUnit { id: b.clone() },
            DiscoveryEvent::Metadata { id: a.clone(), meta: meta_a.clone() },
            DiscoveryEvent::ScannerParameters { id: b.clone(), params: params_b.clone() },
            DiscoveryEvent::AddEndpoint { id: a.clone(), endpoint: "ipp://h/a".into() },
        ];
        let second = vec![
            DiscoveryEvent::AddUnit { id: b.clone() },
            DiscoveryEvent::ScannerParameters { id: b.clone(), params: params_b },
            DiscoveryEvent::AddUnit { id: a.clone() },
            DiscoveryEvent::AddEndpoint { id: a.clone(), endpoint: "ipp://h/a".into() },
            DiscoveryEvent::Metadata { id: a, meta: meta_a },
        ];

        let mut cache1 = Cache::new();
        for event in &first {
            apply(&mut cache1, event);
        }

        let mut cache2 = Cache::new();
        for event in &second {
            apply(&mut cache2, event);
        }

        assert_eq!(cache1.export(), cache2.export());
        assert_eq!(cache1.endpoints, cache2.endpoints);
    }
}
