pub mod broker_client;
pub mod document_store;
