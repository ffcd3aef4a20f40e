mod basic_agree;
mod conflict_truncation;
mod failures;
mod unreliable;
