use domain::{InterfaceSource, InterfaceStatus, Item};
use url::Url;

use crate::config::InterfaceConfig;

/// Interfaces taken from the `interfaces` section of the configuration
#[derive(Debug, Clone, Default)]
pub struct ConfigInterfaceSource {
    interfaces: Vec<InterfaceConfig>,
}

impl ConfigInterfaceSource {
    pub fn new(interfaces: Vec<InterfaceConfig>) -> Self {
        Self { interfaces }
    }

    fn build(cfg: &InterfaceConfig) -> Option<InterfaceStatus> {
        let name = cfg.display_name.trim();
        if name.is_empty() {
            tracing::error!("Interface with endpoint '{}' has no display name. Skipping.", cfg.endpoint);
            return None;
        }

        let endpoint = cfg.endpoint.trim();
        if !endpoint.is_empty() {
            if let Err(e) = Url::parse(endpoint) {
                tracing::error!("Interface {} has invalid endpoint '{}': {}. Skipping.", name, endpoint, e);
                return None;
            }
        }

        let mut status =
            InterfaceStatus::new(cfg.technology, name, endpoint).with_info(cfg.info.clone());

        for item in &cfg.items {
            if item.form.href.trim().is_empty() {
                tracing::warn!(
                    interface = %name,
                    "Item {} has no href. Skipping.",
                    item.display_name
                );
                continue;
            }
            status.add_item(Item::new(
                item.kind,
                item.location.clone(),
                item.display_name.clone(),
                item.form.clone(),
            ));
        }

        Some(status)
    }
}

impl InterfaceSource for ConfigInterfaceSource {
    fn prepare_information(&self) -> domain::Result<Vec<InterfaceStatus>> {
        Ok(self.interfaces.iter().filter_map(Self::build).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ItemConfig;
    use domain::{FormData, ItemKind, Technology};

    fn item(name: &str, href: &str) -> ItemConfig {
        ItemConfig {
            kind: ItemKind::Property,
            location: format!("props/{}", name),
            display_name: name.to_string(),
            form: FormData::new(href),
        }
    }

    fn interface(tech: Technology, name: &str, endpoint: &str, items: Vec<ItemConfig>) -> InterfaceConfig {
        InterfaceConfig {
            technology: tech,
            display_name: name.to_string(),
            info: String::new(),
            endpoint: endpoint.to_string(),
            items,
        }
    }

    #[test]
    fn test_builds_interfaces_and_items() {
        let source = ConfigInterfaceSource::new(vec![interface(
            Technology::Mqtt,
            "Broker",
            "mqtt://broker:1883",
            vec![item("a", "/Plant/Temp"), item("b", "plant/temp/")],
        )]);

        let list = source.prepare_information().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].technology(), Technology::Mqtt);
        assert_eq!(list[0].items().len(), 2);
        assert_eq!(list[0].items().get_items_for("PLANT/TEMP").len(), 2);
    }

    #[test]
    fn test_invalid_entries_are_skipped() {
        let source = ConfigInterfaceSource::new(vec![
            interface(Technology::Http, "  ", "http://a", vec![]),
            interface(Technology::Http, "Bad", "not a url", vec![]),
            interface(Technology::Http, "NoEndpoint", "", vec![item("x", "")]),
        ]);

        let list = source.prepare_information().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].display_name(), "NoEndpoint");
        assert!(!list[0].has_endpoint());
        assert!(list[0].items().is_empty());
    }
}
