//! SQL repositories.
//!
//! Repositories hold no state of their own; callers pass the `&Connection`
//! in, which keeps transactions in the hands of the store layer.

pub mod op;
