//! Key layout under a common prefix.
//!
//! ```text
//! <prefix>/nodes/<name>       node records
//! <prefix>/register/<name>    leased registration keys
//! <prefix>/election           leased leader key
//! <prefix>/pipelines/<name>   pipeline records
//! <prefix>/status/<name>      node status reports
//! <prefix>/events/<id>        aggregated events
//! ```

/// Deterministic key builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    prefix: String,
}

impl Keyspace {
    /// Creates a keyspace; trailing slashes are trimmed.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn nodes(&self) -> String {
        format!("{}/nodes/", self.prefix)
    }

    pub fn node(&self, name: &str) -> String {
        format!("{}{name}", self.nodes())
    }

    pub fn registrations(&self) -> String {
        format!("{}/register/", self.prefix)
    }

    pub fn registration(&self, name: &str) -> String {
        format!("{}{name}", self.registrations())
    }

    pub fn election(&self) -> String {
        format!("{}/election", self.prefix)
    }

    pub fn pipelines(&self) -> String {
        format!("{}/pipelines/", self.prefix)
    }

    pub fn statuses(&self) -> String {
        format!("{}/status/", self.prefix)
    }

    pub fn status(&self, name: &str) -> String {
        format!("{}{name}", self.statuses())
    }

    pub fn events(&self) -> String {
        format!("{}/events/", self.prefix)
    }

    pub fn event(&self, id: &str) -> String {
        format!("{}{id}", self.events())
    }

    /// Strips `dir` from `key`, returning the trailing name.
    pub fn name_in<'a>(dir: &str, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(dir).filter(|rest| !rest.is_empty())
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new("/nodevisor")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let ks = Keyspace::new("/cdc/");
        assert_eq!(ks.node("n1"), "/cdc/nodes/n1");
        assert_eq!(ks.registration("n1"), "/cdc/register/n1");
        assert_eq!(ks.election(), "/cdc/election");
        assert_eq!(ks.status("n1"), "/cdc/status/n1");
        assert_eq!(ks.event("x"), "/cdc/events/x");
    }

    #[test]
    fn test_name_in() {
        let ks = Keyspace::default();
        let key = ks.node("alpha");
        assert_eq!(Keyspace::name_in(&ks.nodes(), &key), Some("alpha"));
        assert_eq!(Keyspace::name_in(&ks.nodes(), &ks.nodes()), None);
        assert_eq!(Keyspace::name_in(&ks.pipelines(), &key), None);
    }
}
