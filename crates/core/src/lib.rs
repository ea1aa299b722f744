//! Domain logic for the Deco onboarding assistant, independent of any transport.

pub mod gate;
pub mod prompt;
pub mod tools;
pub mod track;
