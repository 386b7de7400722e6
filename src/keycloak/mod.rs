//! Keycloak directory service: the collaborator seam and its Admin API client

mod client;
mod directory;

pub use client::KeycloakClient;
pub use directory::DirectoryService;

#[cfg(test)]
pub use directory::MockDirectoryService;
