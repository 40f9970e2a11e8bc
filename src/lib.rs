pub mod config;
pub mod crypto;
pub mod draw;
pub mod fhe;
pub mod guard;
pub mod ledger;
pub mod lottery;
pub mod reveal;
pub mod session;
pub mod stats;
pub mod status;
pub mod submit;
pub mod types;

pub use config::{DrawMode, LotteryConfig};
pub use crypto::{sha3, verify, Keypair};
pub use draw::{Winner, WinnerSelector};
pub use fhe::{EncryptionService, FheError, LocalEncryptionService};
pub use guard::{InFlight, InFlightPermit};
pub use ledger::{LedgerError, LedgerGateway, LedgerSigner, LocalLedger, LocalLedgerConfig};
pub use lottery::{Lottery, LotteryError, Snapshot};
pub use reveal::{DisplayedValue, RevealOutcome};
pub use session::{SessionError, SessionManager, SessionState};
pub use stats::LotteryStats;
pub use status::{OperationStatus, StatusBoard};
pub use submit::TicketForm;
pub use types::*;
