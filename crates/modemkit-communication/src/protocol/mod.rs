//! AT protocol building blocks
//!
//! Command objects and the response sentence parser. The wire format is
//! ASCII text: commands are terminated with CRLF, responses arrive as
//! CRLF-delimited sentences with `OK`/`ERROR` as case-sensitive terminal
//! sentinels.

pub mod command;
pub mod parser;
