pub(crate) mod parking_server;
