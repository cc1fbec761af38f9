pub(crate) mod parking_client;
pub(crate) mod shell;
