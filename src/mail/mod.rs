pub mod address_list;
pub mod imap_client;
pub mod session;
