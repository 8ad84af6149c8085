//! Built-in annotation agents. Their output is ground truth and never
//! reaches perception or reasoning.

pub mod audio_ground_truth;
pub mod hidden_cards;
