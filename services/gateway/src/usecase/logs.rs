use uuid::Uuid;

use hooki_domain::pagination::LogPage;

use crate::domain::repository::AuditLog;
use crate::domain::types::LogEntry;
use crate::error::GatewayError;

pub struct ListLogsUseCase<L>
where
    L: AuditLog,
{
    pub logs: L,
}

impl<L> ListLogsUseCase<L>
where
    L: AuditLog,
{
    pub async fn execute(
        &self,
        flow_id: Uuid,
        page: LogPage,
    ) -> Result<Vec<LogEntry>, GatewayError> {
        self.logs.list(flow_id, page.clamped()).await
    }
}

pub struct GetLogUseCase<L>
where
    L: AuditLog,
{
    pub logs: L,
}

impl<L> GetLogUseCase<L>
where
    L: AuditLog,
{
    pub async fn execute(&self, log_id: Uuid) -> Result<LogEntry, GatewayError> {
        self.logs
            .get(log_id)
            .await?
            .ok_or(GatewayError::LogNotFound)
    }
}
