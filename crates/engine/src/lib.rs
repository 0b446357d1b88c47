pub mod dispatcher;
pub mod events;
pub mod leads;
pub mod registry;
pub mod store;
pub mod sync;
pub mod users;
