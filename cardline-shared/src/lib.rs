pub mod pii;

pub use pii::{mask_card_number, Masked};
