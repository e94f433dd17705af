//! Tenant-scoped loading (C3). Every command loads its aggregate by id and then checks
//! `model.tenant_id != tenant_id` before mutating it — the same pattern the teacher's repository
//! layer centralizes behind `BaseRepository`. [`TenantScope`] centralizes that pattern here: it
//! refuses to exist for a blank tenant id, and `load` folds the not-found-by-id and
//! wrong-tenant-is-also-not-found checks into one call so a command can't forget the second one.

use sea_orm::{ConnectionTrait, EntityTrait, PrimaryKeyTrait};

use crate::errors::AppError;

/// Implemented by every sea-orm model that carries a `tenant_id` column.
pub trait TenantOwned {
    fn tenant_id(&self) -> &str;
}

/// A tenant id that has already been checked non-blank. Commands build one at the top of
/// `execute` and use it for every load in that transaction.
#[derive(Debug, Clone)]
pub struct TenantScope {
    tenant_id: String,
}

impl TenantScope {
    pub fn new(tenant_id: impl Into<String>) -> Result<Self, AppError> {
        let tenant_id = tenant_id.into();
        if tenant_id.trim().is_empty() {
            return Err(AppError::system("tenant id must not be blank"));
        }
        Ok(Self { tenant_id })
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Loads a row by primary key, treating both a missing row and a row owned by a different
    /// tenant as not-found — a caller can't distinguish "doesn't exist" from "exists, but not
    /// yours" from the response, which is the point.
    pub async fn load<E, C>(
        &self,
        conn: &C,
        id: <E::PrimaryKey as PrimaryKeyTrait>::ValueType,
    ) -> Result<E::Model, AppError>
    where
        E: EntityTrait,
        E::Model: TenantOwned,
        C: ConnectionTrait,
    {
        let model = E::find_by_id(id)
            .one(conn)
            .await?
            .ok_or_else(AppError::not_found)?;
        if model.tenant_id() != self.tenant_id {
            return Err(AppError::not_found());
        }
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("\t\n")]
    fn blank_tenant_id_is_rejected(#[case] tenant_id: &str) {
        assert!(TenantScope::new(tenant_id).is_err());
    }

    #[rstest]
    #[case("tenant-acme")]
    #[case("t")]
    #[case("  tenant-with-surrounding-space  ")]
    fn non_blank_tenant_id_is_accepted(#[case] tenant_id: &str) {
        let scope = TenantScope::new(tenant_id).expect("valid tenant id");
        assert_eq!(scope.tenant_id(), tenant_id);
    }
}
