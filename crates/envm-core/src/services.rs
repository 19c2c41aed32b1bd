//! The full set of domain services wired over one storage backend.

use std::sync::Arc;

use envm_storage::StorageBackend;

use crate::accounts::AccountService;
use crate::environments::EnvironmentService;
use crate::notify::Notifier;
use crate::orgs::OrgService;
use crate::projects::ProjectService;
use crate::repository::Repository;
use crate::session::{SessionManager, SessionTtls};
use crate::values::ValueCipher;

/// Every service sharing one [`Repository`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Services {
    pub repo: Repository,
    pub sessions: SessionManager,
    pub accounts: AccountService,
    pub orgs: OrgService,
    pub projects: ProjectService,
    pub environments: EnvironmentService,
}

impl Services {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, notifier: Arc<dyn Notifier>, values: ValueCipher) -> Self {
        Self::with_ttls(storage, notifier, values, SessionTtls::default())
    }

    #[must_use]
    pub fn with_ttls(
        storage: Arc<dyn StorageBackend>,
        notifier: Arc<dyn Notifier>,
        values: ValueCipher,
        ttls: SessionTtls,
    ) -> Self {
        let repo = Repository::new(storage);
        let sessions = SessionManager::with_ttls(repo.clone(), notifier, ttls);
        Self {
            accounts: AccountService::new(repo.clone(), sessions.clone()),
            orgs: OrgService::new(repo.clone(), sessions.clone()),
            projects: ProjectService::new(repo.clone()),
            environments: EnvironmentService::new(repo.clone(), values),
            sessions,
            repo,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod testing {
    use std::ops::Deref;
    use std::sync::Arc;

    use envm_storage::MemoryBackend;
    use uuid::Uuid;

    use super::Services;
    use crate::accounts::NewUser;
    use crate::crypto::EncryptionKey;
    use crate::environments::NewEnvironment;
    use crate::models::{Environment, Organization, Project};
    use crate::notify::MemoryNotifier;
    use crate::orgs::NewOrganization;
    use crate::projects::NewProject;
    use crate::values::ValueCipher;

    /// In-memory services plus the notifier they send through.
    pub struct Harness {
        services: Services,
        pub notifier: MemoryNotifier,
    }

    impl Deref for Harness {
        type Target = Services;

        fn deref(&self) -> &Services {
            &self.services
        }
    }

    impl Harness {
        pub fn new() -> Self {
            let notifier = MemoryNotifier::new();
            let services = Services::new(
                Arc::new(MemoryBackend::new()),
                Arc::new(notifier.clone()),
                ValueCipher::new(EncryptionKey::generate()),
            );
            Self { services, notifier }
        }

        pub async fn org(&self, owner: Uuid, name: &str) -> Organization {
            self.orgs
                .create(
                    owner,
                    NewOrganization {
                        name: name.to_owned(),
                        slug: None,
                    },
                )
                .await
                .unwrap()
        }

        pub async fn project(&self, actor: Uuid, org_id: Uuid, name: &str) -> Project {
            self.projects
                .create(
                    actor,
                    org_id,
                    NewProject {
                        name: name.to_owned(),
                        slug: None,
                        description: None,
                    },
                )
                .await
                .unwrap()
        }

        pub async fn env(&self, actor: Uuid, project_id: Uuid, name: &str) -> Environment {
            self.environments
                .create(
                    actor,
                    project_id,
                    NewEnvironment {
                        name: name.to_owned(),
                        slug: None,
                    },
                )
                .await
                .unwrap()
        }
    }

    /// Register `email` with a fixed password and return the user id.
    pub async fn register(h: &Harness, email: &str) -> Uuid {
        h.accounts
            .register(NewUser {
                email: email.to_owned(),
                password: "correct horse".to_owned(),
                full_name: email.split('@').next().unwrap_or(email).to_owned(),
            })
            .await
            .unwrap()
            .id
    }
}
