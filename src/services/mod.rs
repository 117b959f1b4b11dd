//! Services module for business logic shared by the payment flows

pub mod charge_bands;

pub use charge_bands::{
    BulkCharge, ChargeBand, ChargeBandEngine, ChargeCategory, ChargeError, ChargeItem,
    ChargeQuote, ChargeTable, MemoryChargeTable,
};
