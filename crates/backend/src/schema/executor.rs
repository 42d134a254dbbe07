use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};

use super::ddl::{PlannedStatement, SchemaPlan};
use super::dialect::Dialect;
use super::error::{
    classify_failure, database_error_parts, DbFailure, ExecutionError, ObjectKind, SchemaError,
};

/// Applies a [`SchemaPlan`] inside a single transaction.
///
/// Any failing statement rolls back everything before it, registry
/// bookkeeping included. Nothing is retried.
#[derive(Debug, Clone)]
pub struct SchemaExecutor {
    db: DatabaseConnection,
    dialect: Dialect,
}

impl SchemaExecutor {
    pub fn new(db: DatabaseConnection, dialect: Dialect) -> Self {
        Self { db, dialect }
    }

    /// Returns the number of DDL statements applied
    pub async fn execute(&self, plan: &SchemaPlan) -> Result<usize, SchemaError> {
        let txn = self.db.begin().await?;

        for (index, statement) in plan.statements.iter().enumerate() {
            tracing::debug!(
                table = plan.table.as_str(),
                index,
                operation = plan.operation_label(statement),
                sql = %statement.sql,
                "Executing DDL statement"
            );
            if let Err(err) = txn.execute(self.dialect.statement(statement.sql.clone())).await {
                rollback(txn, plan).await;
                return Err(self.failure(plan, index, statement, &err));
            }
        }

        for (offset, statement) in plan.bookkeeping.iter().enumerate() {
            if let Err(err) = txn.execute(statement.clone()).await {
                rollback(txn, plan).await;
                let (code, cause) = database_error_parts(&err);
                return Err(ExecutionError {
                    failed_index: plan.statements.len() + offset,
                    operation: "registry".to_string(),
                    statement: statement.sql.clone(),
                    code,
                    cause,
                }
                .into());
            }
        }

        if let Err(err) = txn.commit().await {
            let (code, cause) = database_error_parts(&err);
            tracing::error!(table = plan.table.as_str(), error = %cause, "Commit failed");
            return Err(ExecutionError {
                failed_index: plan.statements.len(),
                operation: "commit".to_string(),
                statement: "COMMIT".to_string(),
                code,
                cause,
            }
            .into());
        }

        tracing::info!(
            table = plan.table.as_str(),
            statements = plan.statements.len(),
            operations = ?plan.operations,
            "Schema change committed"
        );
        Ok(plan.statements.len())
    }

    fn failure(
        &self,
        plan: &SchemaPlan,
        index: usize,
        statement: &PlannedStatement,
        err: &DbErr,
    ) -> SchemaError {
        let (code, cause) = database_error_parts(err);
        let operation = plan.operation_label(statement);
        tracing::error!(
            table = plan.table.as_str(),
            index,
            operation,
            code = code.as_deref().unwrap_or("-"),
            error = %cause,
            "DDL statement failed, transaction rolled back"
        );

        let field = statement
            .column
            .clone()
            .unwrap_or_else(|| plan.table.as_str().to_string());
        match classify_failure(self.dialect, code.as_deref(), &cause) {
            DbFailure::Constraint => SchemaError::constraint_violation(
                field,
                statement.constraint.clone(),
                cause,
                format!(
                    "Existing data conflicts with '{}'; fix the rows or change the column definition",
                    statement.summary
                ),
            ),
            DbFailure::Missing => SchemaError::not_found(ObjectKind::Object, field),
            DbFailure::Other => ExecutionError {
                failed_index: index,
                operation: operation.to_string(),
                statement: statement.sql.clone(),
                code,
                cause,
            }
            .into(),
        }
    }
}

async fn rollback(txn: DatabaseTransaction, plan: &SchemaPlan) {
    if let Err(e) = txn.rollback().await {
        // the connection drops the transaction either way
        tracing::warn!(table = plan.table.as_str(), error = %e, "Rollback failed");
    }
}
