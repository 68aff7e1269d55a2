//! Recursive e-mail-domain DNS resolution (spec §4.5, §4.8).
//!
//! Registration triggers a small, bounded BFS over a handful of record
//! types: the domain's MX/A/AAAA/TXT records plus its `_dmarc` TXT record,
//! and then the A/AAAA records of anything an MX pointed at. Each record
//! becomes one [`ResolvedRecord`]; MX children carry the index of the MX
//! record that produced them so callers can rebuild the parent-linked tree
//! in the store (see [`crate::db::registration::RegistrationRepository::insert_email_resolve`]).

use async_trait::async_trait;
use std::collections::VecDeque;

/// A DNS record type this resolver cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    Mx,
    A,
    Aaaa,
    Txt,
}

impl RecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Mx => "MX",
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Txt => "TXT",
        }
    }
}

/// One resolved record: its type, its textual value (a hostname for
/// MX/A/AAAA, the raw string for TXT), and the index of the record that
/// caused it to be looked up, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRecord {
    pub parent: Option<usize>,
    pub record_type: RecordType,
    pub value: String,
}

/// A DNS lookup. A failed lookup (NXDOMAIN, timeout, refused) resolves to
/// an empty vec rather than an error — spec §7: "DNS failure: skip the
/// record, continue with the rest of the tree".
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, record_type: RecordType, name: &str) -> Vec<String>;
}

/// Production resolver backed by the system's configured nameservers.
pub struct SystemResolver {
    inner: hickory_resolver::TokioResolver,
}

impl SystemResolver {
    pub fn new() -> Self {
        let inner = hickory_resolver::TokioResolver::builder_tokio()
            .map(|b| b.build())
            .unwrap_or_else(|_| {
                hickory_resolver::TokioResolver::builder_with_config(
                    hickory_resolver::config::ResolverConfig::default(),
                    hickory_resolver::name_server::TokioConnectionProvider::default(),
                )
                .build()
            });
        Self { inner }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, record_type: RecordType, name: &str) -> Vec<String> {
        match record_type {
            RecordType::Mx => match self.inner.mx_lookup(name).await {
                Ok(lookup) => lookup
                    .iter()
                    .map(|mx| mx.exchange().to_string().trim_end_matches('.').to_string())
                    .collect(),
                Err(e) => {
                    tracing::debug!(name, error = %e, "mx lookup failed");
                    Vec::new()
                }
            },
            RecordType::A => match self.inner.ipv4_lookup(name).await {
                Ok(lookup) => lookup.iter().map(|ip| ip.to_string()).collect(),
                Err(e) => {
                    tracing::debug!(name, error = %e, "a lookup failed");
                    Vec::new()
                }
            },
            RecordType::Aaaa => match self.inner.ipv6_lookup(name).await {
                Ok(lookup) => lookup.iter().map(|ip| ip.to_string()).collect(),
                Err(e) => {
                    tracing::debug!(name, error = %e, "aaaa lookup failed");
                    Vec::new()
                }
            },
            RecordType::Txt => match self.inner.txt_lookup(name).await {
                Ok(lookup) => lookup.iter().map(|txt| txt.to_string()).collect(),
                Err(e) => {
                    tracing::debug!(name, error = %e, "txt lookup failed");
                    Vec::new()
                }
            },
        }
    }
}

/// Walk the MX -> A/AAAA tree rooted at `email_domain`, plus its root TXT
/// (SPF) and `_dmarc` TXT (DMARC) records. Bounded by construction: only
/// MX results enqueue further lookups, and each MX is only followed one
/// level deep.
pub async fn recursive_mx_resolve(
    resolver: &dyn Resolver,
    email_domain: &str,
) -> Vec<ResolvedRecord> {
    let mut to_resolve: VecDeque<(Option<usize>, RecordType, String)> = VecDeque::from([
        (None, RecordType::Mx, email_domain.to_string()),
        (None, RecordType::A, email_domain.to_string()),
        (None, RecordType::Aaaa, email_domain.to_string()),
        (None, RecordType::Txt, email_domain.to_string()),
        (None, RecordType::Txt, format!("_dmarc.{email_domain}")),
    ]);

    let mut resolved = Vec::new();

    while let Some((parent, record_type, name)) = to_resolve.pop_front() {
        let values = resolver.resolve(record_type, &name).await;

        for value in values {
            let this_index = resolved.len();
            resolved.push(ResolvedRecord {
                parent,
                record_type,
                value: value.clone(),
            });

            if record_type == RecordType::Mx {
                to_resolve.push_back((Some(this_index), RecordType::A, value.clone()));
                to_resolve.push_back((Some(this_index), RecordType::Aaaa, value));
            }
        }
    }

    resolved
}


#[cfg(test)]
mod tests {
    use super::fake::FakeResolver;
    use super::*;

    #[tokio::test]
    async fn mx_children_resolve_one_level_of_a_and_aaaa() {
        let resolver = FakeResolver::new()
            .with(RecordType::Mx, "example.org", &["mx1.example.org"])
            .with(RecordType::A, "mx1.example.org", &["1.2.3.4"])
            .with(RecordType::Aaaa, "mx1.example.org", &["::1"])
            .with(RecordType::Txt, "example.org", &["v=spf1 -all"])
            .with(RecordType::Txt, "_dmarc.example.org", &["v=DMARC1; p=reject"]);

        let resolved = recursive_mx_resolve(&resolver, "example.org").await;

        let mx = resolved
            .iter()
            .position(|r| r.record_type == RecordType::Mx)
            .expect("mx record present");
        assert_eq!(resolved[mx].value, "mx1.example.org");
        assert!(resolved[mx].parent.is_none());

        let mx_a = resolved
            .iter()
            .find(|r| r.record_type == RecordType::A)
            .expect("a record present");
        assert_eq!(mx_a.parent, Some(mx));

        let mx_aaaa = resolved
            .iter()
            .find(|r| r.record_type == RecordType::Aaaa)
            .expect("aaaa record present");
        assert_eq!(mx_aaaa.parent, Some(mx));

        assert!(resolved
            .iter()
            .any(|r| r.record_type == RecordType::Txt && r.value.starts_with("v=spf1")));
        assert!(resolved
            .iter()
            .any(|r| r.record_type == RecordType::Txt && r.value.starts_with("v=DMARC1")));
    }

    #[tokio::test]
    async fn a_domain_with_no_mx_only_yields_root_records() {
        let resolver = FakeResolver::new().with(RecordType::A, "noemail.org", &["5.6.7.8"]);
        let resolved = recursive_mx_resolve(&resolver, "noemail.org").await;
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].record_type, RecordType::A);
    }

    #[tokio::test]
    async fn failed_lookups_are_silently_skipped() {
        let resolver = FakeResolver::new();
        let resolved = recursive_mx_resolve(&resolver, "nowhere.invalid").await;
        assert!(resolved.is_empty());
    }
}
