mod client;
mod download;
mod store;

pub use client::{
    ApiErrorClass, Attachment, DEFAULT_PAGE_SIZE, Page, PageClient, PageError, PageRef,
};
pub use store::{PageWriter, RemoteStore};
