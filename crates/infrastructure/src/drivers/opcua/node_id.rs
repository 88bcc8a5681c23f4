use regex::Regex;
use std::sync::OnceLock;

/// Identifier part of a node id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Numeric(u32),
    String(String),
}

/// Namespace-qualified node id as written in an item's href
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpcNodeId {
    pub namespace: u16,
    pub identifier: Identifier,
}

struct Grammars {
    numeric: Regex,
    numeric_pipe: Regex,
    string: Regex,
    string_pipe: Regex,
}

fn grammars() -> &'static Grammars {
    static GRAMMARS: OnceLock<Grammars> = OnceLock::new();
    GRAMMARS.get_or_init(|| Grammars {
        numeric: Regex::new(r"(?i)^\s*ns\s*=\s*(\d+)\s*;\s*i\s*=\s*(\d+)\s*$").expect("Invalid regex"),
        numeric_pipe: Regex::new(r"(?i)^\s*ns\s*(\d+)\s*\|\s*numeric\s*\|\s*(\d+)\s*$")
            .expect("Invalid regex"),
        string: Regex::new(r"(?i)^\s*ns\s*=\s*(\d+)\s*;\s*s\s*=(.+)$").expect("Invalid regex"),
        string_pipe: Regex::new(r"(?i)^\s*ns\s*(\d+)\s*\|\s*alphanumeric\s*\|(.+)$")
            .expect("Invalid regex"),
    })
}

impl OpcNodeId {
    pub fn numeric(namespace: u16, id: u32) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(id),
        }
    }

    pub fn string(namespace: u16, id: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(id.into()),
        }
    }

    /// Accepts `ns=<n>;i=<n>`, `NS<n>|Numeric|<n>`, `ns=<n>;s=<id>` and
    /// `NS<n>|Alphanumeric|<id>`. Returns `None` for anything else.
    pub fn parse(text: &str) -> Option<Self> {
        let g = grammars();

        for re in [&g.numeric, &g.numeric_pipe] {
            if let Some(caps) = re.captures(text) {
                let namespace = caps[1].parse().ok()?;
                let id = caps[2].parse().ok()?;
                return Some(Self::numeric(namespace, id));
            }
        }

        for re in [&g.string, &g.string_pipe] {
            if let Some(caps) = re.captures(text) {
                let namespace = caps[1].parse().ok()?;
                let id = caps[2].trim();
                if id.is_empty() {
                    return None;
                }
                return Some(Self::string(namespace, id));
            }
        }

        None
    }
}

impl std::fmt::Display for OpcNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.identifier {
            Identifier::Numeric(id) => write!(f, "ns={};i={}", self.namespace, id),
            Identifier::String(id) => write!(f, "ns={};s={}", self.namespace, id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_grammar() {
        assert_eq!(OpcNodeId::parse("ns=2;i=1001"), Some(OpcNodeId::numeric(2, 1001)));
        assert_eq!(OpcNodeId::parse(" NS = 2 ; I = 7 "), Some(OpcNodeId::numeric(2, 7)));
    }

    #[test]
    fn test_numeric_pipe_grammar() {
        assert_eq!(OpcNodeId::parse("NS4|Numeric|6001"), Some(OpcNodeId::numeric(4, 6001)));
        assert_eq!(OpcNodeId::parse("ns4 | numeric | 12"), Some(OpcNodeId::numeric(4, 12)));
    }

    #[test]
    fn test_string_grammar() {
        assert_eq!(
            OpcNodeId::parse("ns=3;s=Line1.Motor.Speed"),
            Some(OpcNodeId::string(3, "Line1.Motor.Speed"))
        );
    }

    #[test]
    fn test_alphanumeric_pipe_grammar() {
        assert_eq!(
            OpcNodeId::parse("NS3|Alphanumeric|Foo.Bar"),
            Some(OpcNodeId::string(3, "Foo.Bar"))
        );
        assert_eq!(
            OpcNodeId::parse("  ns3 | ALPHANUMERIC |  Foo.Bar "),
            Some(OpcNodeId::string(3, "Foo.Bar"))
        );
    }

    #[test]
    fn test_malformed_input() {
        assert_eq!(OpcNodeId::parse("garbage"), None);
        assert_eq!(OpcNodeId::parse("ns=2;i=abc"), None);
        assert_eq!(OpcNodeId::parse("ns=2;s=   "), None);
        assert_eq!(OpcNodeId::parse("ns=99999;i=1"), None);
        assert_eq!(OpcNodeId::parse(""), None);
    }

    #[test]
    fn test_display_is_canonical() {
        assert_eq!(OpcNodeId::numeric(2, 1001).to_string(), "ns=2;i=1001");
        assert_eq!(OpcNodeId::string(3, "Foo.Bar").to_string(), "ns=3;s=Foo.Bar");
    }
}
