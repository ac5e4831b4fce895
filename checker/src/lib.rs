pub mod aggregate;
pub mod logging;
pub mod oracle;
pub mod orchestrator;
pub mod process;
pub mod render;
pub mod stages;
pub mod toolchain;
pub mod visualize;
