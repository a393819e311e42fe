pub mod endpoint;
pub mod generator;
pub mod metrics;
pub mod registry;
pub mod scanner;
pub mod system;
pub mod tester;

pub use endpoint::{Endpoint, EndpointStatus, Health};
pub use generator::LoadGenerator;
pub use metrics::{MetricsWindow, RequestResult, Stats};
pub use registry::{Monitored, Registry};
pub use scanner::{ScanResult, Scanner, ScannerConfig};
pub use system::{SystemMetrics, SystemMonitor};
pub use tester::{LoadTester, TesterOptions};
