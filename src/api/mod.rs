pub mod client;
pub mod prices;
pub mod probe;

pub use client::ReqwestClient;
pub use prices::PriceFetcher;
pub use probe::AvailabilityProbe;
