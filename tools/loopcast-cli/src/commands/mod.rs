pub mod check;
pub mod convert;
pub mod native_host;
pub mod record;
pub mod serve;
pub mod status;
