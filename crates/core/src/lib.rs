//! beistand-core – Gemeinsame Grundtypen
//!
//! Dieses Crate stellt den Raumnamen-Newtype und die Raumnamen-Erzeugung
//! bereit, die von allen anderen Beistand-Crates geteilt werden. Es hat
//! bewusst keine Abhaengigkeit auf Datenbank oder Netzwerk.

pub mod raum;

// Bequeme Re-Exporte
pub use raum::{gruppen_raum_name, quick_connect_raum_name, RaumId};
