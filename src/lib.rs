pub mod cli;
pub mod client_ip;
pub mod clock;
pub mod cors;
pub mod directory;
pub mod email;
pub mod http_err;
pub mod passwords;
pub mod rate_limit;
pub mod reaper;
pub mod recovery;
pub mod server;
pub mod tokens;
