//! Built-in perception agents, in pipeline order.

pub mod action_detector;
pub mod board_parser;
pub mod cue_analyzer;
pub mod phase_segmenter;
