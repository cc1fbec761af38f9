pub(crate) mod allocator;
pub(crate) mod parking_lot;
