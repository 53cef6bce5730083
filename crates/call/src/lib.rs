//! beistand-call – Anruf-Zustandsmaschine und Medien-Collaborators
//!
//! Lebenszyklus eines Anrufs:
//!
//! ```text
//! Idle -> Calling   (Anrufer: Einladung versendet, wartet auf Antwort)
//!      -> Ringing   (Angerufener: Einladung empfangen, 30s Auto-Decline)
//! Calling|Ringing -> Connecting  (Token holen, Medien-Sitzung aufbauen)
//! Connecting -> Connected        (lokale Tracks veroeffentlicht)
//! *          -> Ended            (Auflegen, Gegenseite, oder Fehler)
//! Ended      -> Idle             (automatisch nach kurzer Anzeige)
//! ```
//!
//! Die Maschine kennt den Medien-Server nur ueber die Traits
//! [`MediaConnector`]/[`MediaSession`] und den Token-Dienst nur ueber
//! [`TokenIssuer`]. Tests haengen Mocks ein, der Server den
//! Reqwest-gestuetzten [`HttpTokenIssuer`].

pub mod error;
pub mod media;
pub mod session;
pub mod token;

// Bequeme Re-Exporte
pub use error::{CallError, CallResult};
pub use media::{MediaConnector, MediaEvent, MediaSession, TrackArt};
pub use session::{AnrufPhase, CallSession};
pub use token::{HttpTokenIssuer, TokenAntwort, TokenIssuer};
