pub(crate) mod lot_error;
pub(crate) mod client_error;
pub(crate) mod command_error;
