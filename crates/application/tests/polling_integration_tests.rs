// End-to-end polling through the real driver factory and a bounded-concurrency
// check with an instrumented connection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use application::AllInterfaceStatus;
use application::status::DEFAULT_MAX_CONCURRENCY;
use domain::{
    AidConnection, ConnectionProvider, FormData, InterfaceStatus, Item, ItemKind, LogColor,
    Technology,
};
use infrastructure::DriverFactory;

// ── Helpers ─────────────────────────────────────────────────────────

fn http_interface(name: &str, endpoint: &str, hrefs: &[&str]) -> InterfaceStatus {
    let mut iface = InterfaceStatus::new(Technology::Http, name, endpoint);
    for href in hrefs {
        iface.add_item(Item::new(
            ItemKind::Property,
            format!("{}/properties", name),
            *href,
            FormData::new(*href),
        ));
    }
    iface
}

/// Connection that sleeps on every read and records the peak of parallel reads
struct SlowConnection {
    uri: Url,
    in_flight: AtomicUsize,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl AidConnection for SlowConnection {
    fn technology(&self) -> Technology {
        Technology::Http
    }
    fn target_uri(&self) -> &Url {
        &self.uri
    }
    fn last_active(&self) -> Option<DateTime<Utc>> {
        None
    }
    async fn open(&self) -> domain::Result<()> {
        Ok(())
    }
    fn is_connected(&self) -> bool {
        true
    }
    async fn close(&self) {}
    async fn update_item_value(&self, item: &Item) -> domain::Result<usize> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(usize::from(item.set_value("1")))
    }
    async fn update_item_value_async(&self, item: &Item) -> domain::Result<usize> {
        self.update_item_value(item).await
    }
    fn supports_concurrent_updates(&self) -> bool {
        true
    }
}

struct SlowProvider {
    peak: Arc<AtomicUsize>,
}

impl ConnectionProvider for SlowProvider {
    fn create(&self, _technology: Technology, uri: &Url) -> Arc<dyn AidConnection> {
        Arc::new(SlowConnection {
            uri: uri.clone(),
            in_flight: AtomicUsize::new(0),
            peak: self.peak.clone(),
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_single_shot_reads_http_device() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/temperature"))
        .respond_with(ResponseTemplate::new(200).set_body_string("42"))
        .expect(1)
        .mount(&server)
        .await;

    let status = AllInterfaceStatus::new(Arc::new(DriverFactory::default()));
    status.set_interfaces(vec![http_interface(
        "Weather",
        &server.uri(),
        &["/temperature"],
    )]);

    let changes = status.update_values_single_shot().await;
    assert_eq!(changes, 1);
    assert!(status.sum_value_changes() >= 1);

    let iface = status.interfaces()[0].clone();
    let item = iface.items().all()[0].clone();
    assert_eq!(item.value(), "42");
    assert!(iface.connection().is_none());

    let registry = status.registry(Technology::Http);
    assert_eq!(registry.len(), 1);
    assert!(registry.connections().iter().all(|c| !c.is_connected()));
}

#[tokio::test]
async fn test_unreachable_device_marks_interface_red() {
    let status = AllInterfaceStatus::new(Arc::new(DriverFactory::default()));
    status.set_interfaces(vec![http_interface("Broken", "not a uri", &["/x"])]);

    assert_eq!(status.update_values_single_shot().await, 0);
    let line = status.interfaces()[0].log_line();
    assert_eq!(line.color, LogColor::Red);
    assert!(line.text.contains("Invalid endpoint"));
}

#[tokio::test]
async fn test_concurrent_reads_are_bounded() {
    let peak = Arc::new(AtomicUsize::new(0));
    let status = AllInterfaceStatus::new(Arc::new(SlowProvider { peak: peak.clone() }))
        .with_max_concurrency(4);

    let hrefs: Vec<String> = (0..20).map(|i| format!("/p{}", i)).collect();
    let hrefs: Vec<&str> = hrefs.iter().map(String::as_str).collect();
    status.set_interfaces(vec![http_interface("Many", "http://device.local/", &hrefs)]);

    let changes = status.update_values_single_shot().await;
    assert_eq!(changes, 20);
    let peak = peak.load(Ordering::SeqCst);
    assert!(peak >= 2, "reads never overlapped");
    assert!(peak <= 4, "peak {} above limit", peak);
}

#[tokio::test]
async fn test_default_limit_is_ten_reads() {
    let peak = Arc::new(AtomicUsize::new(0));
    let status = AllInterfaceStatus::new(Arc::new(SlowProvider { peak: peak.clone() }));
    assert_eq!(status.max_concurrency(), DEFAULT_MAX_CONCURRENCY);
    assert_eq!(DEFAULT_MAX_CONCURRENCY, 10);

    let hrefs: Vec<String> = (0..30).map(|i| format!("/p{}", i)).collect();
    let hrefs: Vec<&str> = hrefs.iter().map(String::as_str).collect();
    status.set_interfaces(vec![http_interface("Many", "http://device.local/", &hrefs)]);

    assert_eq!(status.update_values_single_shot().await, 30);
    let peak = peak.load(Ordering::SeqCst);
    assert!(peak > 1, "reads never overlapped");
    assert!(peak <= 10, "peak {} above limit", peak);
}
