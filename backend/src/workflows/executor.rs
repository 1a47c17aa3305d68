// Workflow Executor - Performs the side effect of a single action

use chrono::Duration;
use leadflow_shared::{Activity, Deal, EntityKind, Note, Notification, Task};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::actions::*;
use super::context::ExecutionContext;
use super::template::render;
use crate::services::{Clock, EmailSender, MessageSender, OutgoingEmail};
use crate::store::{CrmStore, DealUpdate};

type ActionOutcome = Result<serde_json::Value, String>;

/// Validates, templates and dispatches one action.
///
/// `execute` never fails: a missing precondition, a provider failure or a
/// datastore error all come back as a `success: false` result.
#[derive(Clone)]
pub struct ActionExecutor {
    crm: Arc<dyn CrmStore>,
    sms: Arc<dyn MessageSender>,
    email: Arc<dyn EmailSender>,
    clock: Arc<dyn Clock>,
}

impl ActionExecutor {
    pub fn new(
        crm: Arc<dyn CrmStore>,
        sms: Arc<dyn MessageSender>,
        email: Arc<dyn EmailSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            crm,
            sms,
            email,
            clock,
        }
    }

    pub async fn execute(
        &self,
        action: &Action,
        context: &ExecutionContext,
        workflow_id: Uuid,
    ) -> ExecutionResult {
        info!(
            workflow_id = %workflow_id,
            action_id = %action.id,
            "Executing action: {}", action.action_type()
        );

        let outcome = match &action.kind {
            ActionKind::SendSms(config) => self.send_sms(config, context).await,
            ActionKind::SendEmail(config) => self.send_email(config, context).await,
            ActionKind::SendNotification(config) => {
                self.send_notification(config, context, workflow_id).await
            }
            ActionKind::UpdateStatus(config) => self.update_status(config, context).await,
            ActionKind::AddNote(config) => self.add_note(config, context).await,
            ActionKind::CreateTask(config) => self.create_task(config, context).await,
            ActionKind::AssignUser(config) => self.assign_user(config, context).await,
            ActionKind::MoveLeadStage(config) => self.move_lead_stage(config, context).await,
            ActionKind::CreateDeal(config) => self.create_deal(config, context).await,
            ActionKind::UpdateDeal(config) => self.update_deal(config, context).await,
            ActionKind::MoveDealStage(config) => self.move_deal_stage(config, context).await,
            ActionKind::CloseDeal(config) => self.close_deal(config, context).await,
            ActionKind::AddTag(config) => self.add_tag(config, context).await,
            ActionKind::RemoveTag(config) => self.remove_tag(config, context).await,
            ActionKind::LogActivity(config) => self.log_activity(config, context).await,
            // The runner handles these itself
            ActionKind::Wait(config) => Ok(json!({
                "duration": config.duration,
                "unit": config.unit.as_str(),
            })),
            ActionKind::Condition(_) => Ok(json!({ "skipped": true })),
        };

        let now = self.clock.now();
        match outcome {
            Ok(data) => ExecutionResult::success(action, Some(data), now),
            Err(error) => {
                warn!(
                    workflow_id = %workflow_id,
                    action_id = %action.id,
                    "Action {} failed: {}", action.action_type(), error
                );
                ExecutionResult::failure(action, error, now)
            }
        }
    }

    // ===== Messaging =====

    async fn send_sms(&self, config: &SendSmsConfig, context: &ExecutionContext) -> ActionOutcome {
        let to = config
            .to
            .as_deref()
            .map(|to| render(to, context))
            .filter(|to| !to.trim().is_empty())
            .or_else(|| context.phone())
            .ok_or("No phone number available for SMS")?;

        let message = render(&config.message, context);
        if message.trim().is_empty() {
            return Err("SMS message is empty".to_string());
        }

        let from = self
            .crm
            .default_phone_number(context.tenant_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or("No phone number configured for this workspace")?;

        let outcome = self.sms.send_message(&to, &from, &message).await;
        if !outcome.success {
            return Err(outcome.error.unwrap_or_else(|| "Failed to send SMS".to_string()));
        }

        // The message went out; a failed activity write does not change that
        let activity = self.activity(context, "sms", format!("SMS sent to {}: {}", to, message));
        if let Err(e) = self.crm.log_activity(&activity).await {
            warn!("Failed to record SMS activity: {}", e);
        }

        Ok(json!({ "message_id": outcome.id, "to": to, "from": from }))
    }

    async fn send_email(&self, config: &SendEmailConfig, context: &ExecutionContext) -> ActionOutcome {
        let to = config
            .to
            .as_deref()
            .map(|to| render(to, context))
            .filter(|to| !to.trim().is_empty())
            .or_else(|| context.email())
            .ok_or("No email address available")?;

        let account = self
            .crm
            .default_email_account(context.tenant_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or("No email account connected for this workspace")?;

        let email = OutgoingEmail {
            to: to.clone(),
            cc: config.cc.iter().map(|cc| render(cc, context)).collect(),
            bcc: config.bcc.iter().map(|bcc| render(bcc, context)).collect(),
            subject: render(&config.subject, context),
            body: render(&config.body, context),
        };
        if email.subject.trim().is_empty() && email.body.trim().is_empty() {
            return Err("Email has no subject or body".to_string());
        }

        let outcome = self.email.send_email(&account, &email).await;
        if !outcome.success {
            return Err(outcome.error.unwrap_or_else(|| "Failed to send email".to_string()));
        }

        Ok(json!({ "message_id": outcome.id, "to": to, "from": account.email_address }))
    }

    async fn send_notification(
        &self,
        config: &SendNotificationConfig,
        context: &ExecutionContext,
        workflow_id: Uuid,
    ) -> ActionOutcome {
        let user_id = config
            .user_id
            .or_else(|| context.lead.as_ref().and_then(|l| l.owner_id))
            .unwrap_or(context.user_id);

        let title = render(&config.title, context);
        let message = render(&config.message, context);
        if title.trim().is_empty() && message.trim().is_empty() {
            return Err("Notification has no title or message".to_string());
        }

        let (entity_type, entity_id) = match context.lead_id() {
            Some(id) => (Some(EntityKind::Lead.as_str().to_string()), Some(id)),
            None => (Some("workflow".to_string()), Some(workflow_id)),
        };

        let notification = Notification {
            id: Uuid::new_v4(),
            tenant_id: context.tenant_id,
            user_id,
            title,
            message,
            notification_type: "workflow".to_string(),
            entity_type,
            entity_id,
            read: false,
            created_at: self.clock.now(),
        };

        let id = self
            .crm
            .create_notification(&notification)
            .await
            .map_err(|e| e.to_string())?;
        Ok(json!({ "notification_id": id, "user_id": user_id }))
    }

    // ===== Lead actions =====

    async fn update_status(&self, config: &UpdateStatusConfig, context: &ExecutionContext) -> ActionOutcome {
        let lead_id = context.lead_id().ok_or("No lead in context")?;
        let status = render(&config.status, context);
        if status.trim().is_empty() {
            return Err("Status is required".to_string());
        }

        self.crm
            .update_lead_status(context.tenant_id, lead_id, &status)
            .await
            .map_err(|e| e.to_string())?;
        Ok(json!({ "lead_id": lead_id, "status": status }))
    }

    async fn add_note(&self, config: &AddNoteConfig, context: &ExecutionContext) -> ActionOutcome {
        let (entity, entity_id) = match (context.lead_id(), context.contact_id()) {
            (Some(id), _) => (EntityKind::Lead, id),
            (None, Some(id)) => (EntityKind::Contact, id),
            (None, None) => return Err("No lead or contact in context".to_string()),
        };

        let content = render(&config.content, context);
        if content.trim().is_empty() {
            return Err("Note content is required".to_string());
        }

        let note = Note {
            id: Uuid::new_v4(),
            tenant_id: context.tenant_id,
            entity_type: entity.as_str().to_string(),
            entity_id,
            content,
            created_by: Some(context.user_id),
            created_at: self.clock.now(),
        };
        let id = self.crm.create_note(&note).await.map_err(|e| e.to_string())?;
        Ok(json!({ "note_id": id, "entity_type": entity.as_str(), "entity_id": entity_id }))
    }

    async fn create_task(&self, config: &CreateTaskConfig, context: &ExecutionContext) -> ActionOutcome {
        let lead_id = context.lead_id().ok_or("No lead in context")?;
        let title = render(&config.title, context);
        if title.trim().is_empty() {
            return Err("Task title is required".to_string());
        }

        let now = self.clock.now();
        let due_at = match config.due_in_days {
            Some(days) => Some(
                Duration::try_days(days)
                    .and_then(|offset| now.checked_add_signed(offset))
                    .ok_or_else(|| format!("Task due date out of range ({} days)", days))?,
            ),
            None => None,
        };
        let task = Task {
            id: Uuid::new_v4(),
            tenant_id: context.tenant_id,
            title,
            description: config.description.as_deref().map(|d| render(d, context)),
            status: "open".to_string(),
            priority: config.priority.clone(),
            due_at,
            lead_id: Some(lead_id),
            assigned_to: config
                .assigned_to
                .or_else(|| context.lead.as_ref().and_then(|l| l.owner_id))
                .or(Some(context.user_id)),
            created_at: now,
            completed_at: None,
        };

        let id = self.crm.create_task(&task).await.map_err(|e| e.to_string())?;
        Ok(json!({ "task_id": id, "title": task.title, "due_at": task.due_at }))
    }

    async fn assign_user(&self, config: &AssignUserConfig, context: &ExecutionContext) -> ActionOutcome {
        let lead_id = context.lead_id().ok_or("No lead in context")?;
        let user_id = config.user_id.ok_or("User to assign is required")?;

        self.crm
            .assign_lead(context.tenant_id, lead_id, user_id)
            .await
            .map_err(|e| e.to_string())?;
        Ok(json!({ "lead_id": lead_id, "assigned_to": user_id }))
    }

    async fn move_lead_stage(&self, config: &MoveStageConfig, context: &ExecutionContext) -> ActionOutcome {
        let lead_id = context.lead_id().ok_or("No lead in context")?;
        if config.stage.trim().is_empty() {
            return Err("Stage is required".to_string());
        }

        self.crm
            .update_lead_stage(context.tenant_id, lead_id, &config.stage)
            .await
            .map_err(|e| e.to_string())?;
        Ok(json!({ "lead_id": lead_id, "stage": config.stage }))
    }

    // ===== Deal actions =====

    async fn create_deal(&self, config: &CreateDealConfig, context: &ExecutionContext) -> ActionOutcome {
        let title = render(&config.title, context);
        if title.trim().is_empty() {
            return Err("Deal title is required".to_string());
        }

        let now = self.clock.now();
        let deal = Deal {
            id: Uuid::new_v4(),
            tenant_id: context.tenant_id,
            title,
            value: config.value,
            currency: config.currency.clone(),
            stage: config.stage.clone(),
            status: "open".to_string(),
            lead_id: context.lead_id(),
            contact_id: context.contact_id(),
            owner_id: context
                .lead
                .as_ref()
                .and_then(|l| l.owner_id)
                .or(Some(context.user_id)),
            expected_close_date: None,
            close_reason: None,
            created_at: now,
            updated_at: None,
        };

        let id = self.crm.create_deal(&deal).await.map_err(|e| e.to_string())?;
        Ok(json!({ "deal_id": id, "title": deal.title, "value": deal.value }))
    }

    async fn update_deal(&self, config: &UpdateDealConfig, context: &ExecutionContext) -> ActionOutcome {
        let deal_id = context.deal_id().ok_or("No deal in context")?;
        if config.is_empty() {
            return Err("No deal fields to update".to_string());
        }

        let update = DealUpdate {
            title: config.title.as_deref().map(|t| render(t, context)),
            value: config.value,
            expected_close_date: config.expected_close_date,
        };
        self.crm
            .update_deal(context.tenant_id, deal_id, &update)
            .await
            .map_err(|e| e.to_string())?;
        Ok(json!({ "deal_id": deal_id }))
    }

    async fn move_deal_stage(&self, config: &MoveStageConfig, context: &ExecutionContext) -> ActionOutcome {
        let deal_id = context.deal_id().ok_or("No deal in context")?;
        if config.stage.trim().is_empty() {
            return Err("Stage is required".to_string());
        }

        self.crm
            .move_deal_stage(context.tenant_id, deal_id, &config.stage)
            .await
            .map_err(|e| e.to_string())?;
        Ok(json!({ "deal_id": deal_id, "stage": config.stage }))
    }

    async fn close_deal(&self, config: &CloseDealConfig, context: &ExecutionContext) -> ActionOutcome {
        let deal_id = context.deal_id().ok_or("No deal in context")?;
        let reason = config.reason.as_deref().map(|r| render(r, context));

        self.crm
            .close_deal(context.tenant_id, deal_id, config.outcome, reason.as_deref())
            .await
            .map_err(|e| e.to_string())?;
        Ok(json!({ "deal_id": deal_id, "outcome": config.outcome.as_str() }))
    }

    // ===== Tags and history =====

    fn tag_target(context: &ExecutionContext) -> Result<(EntityKind, Uuid), String> {
        if let Some(id) = context.lead_id() {
            return Ok((EntityKind::Lead, id));
        }
        if let Some(id) = context.contact.as_ref().map(|c| c.id) {
            return Ok((EntityKind::Contact, id));
        }
        if let Some(id) = context.deal_id() {
            return Ok((EntityKind::Deal, id));
        }
        Err("No lead, contact or deal in context".to_string())
    }

    async fn add_tag(&self, config: &TagConfig, context: &ExecutionContext) -> ActionOutcome {
        let (entity, entity_id) = Self::tag_target(context)?;
        let tag = render(&config.tag, context).trim().to_string();
        if tag.is_empty() {
            return Err("Tag is required".to_string());
        }

        let added = self
            .crm
            .add_tag(context.tenant_id, entity, entity_id, &tag)
            .await
            .map_err(|e| e.to_string())?;
        Ok(json!({ "tag": tag, "entity_type": entity.as_str(), "entity_id": entity_id, "added": added }))
    }

    async fn remove_tag(&self, config: &TagConfig, context: &ExecutionContext) -> ActionOutcome {
        let (entity, entity_id) = Self::tag_target(context)?;
        let tag = render(&config.tag, context).trim().to_string();
        if tag.is_empty() {
            return Err("Tag is required".to_string());
        }

        let removed = self
            .crm
            .remove_tag(context.tenant_id, entity, entity_id, &tag)
            .await
            .map_err(|e| e.to_string())?;
        Ok(json!({ "tag": tag, "entity_type": entity.as_str(), "entity_id": entity_id, "removed": removed }))
    }

    async fn log_activity(&self, config: &LogActivityConfig, context: &ExecutionContext) -> ActionOutcome {
        if context.lead_id().is_none() && context.contact_id().is_none() && context.deal_id().is_none() {
            return Err("No lead, contact or deal in context".to_string());
        }
        let description = render(&config.description, context);
        if description.trim().is_empty() {
            return Err("Activity description is required".to_string());
        }

        let activity = self.activity(context, &config.activity_type, description);
        let id = self.crm.log_activity(&activity).await.map_err(|e| e.to_string())?;
        Ok(json!({ "activity_id": id, "activity_type": activity.activity_type }))
    }

    fn activity(&self, context: &ExecutionContext, activity_type: &str, description: String) -> Activity {
        Activity {
            id: Uuid::new_v4(),
            tenant_id: context.tenant_id,
            activity_type: activity_type.to_string(),
            description,
            lead_id: context.lead_id(),
            contact_id: context.contact_id(),
            deal_id: context.deal_id(),
            created_by: Some(context.user_id),
            created_at: self.clock.now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{ManualClock, MockEmailSender, MockMessageSender, SendOutcome};
    use crate::store::InMemoryStore;
    use chrono::{TimeZone, Utc};
    use leadflow_shared::{Contact, EmailAccount, Lead};

    struct Fixture {
        store: Arc<InMemoryStore>,
        tenant_id: Uuid,
        lead: Lead,
    }

    fn fixture() -> Fixture {
        let tenant_id = Uuid::new_v4();
        let lead = Lead {
            id: Uuid::new_v4(),
            tenant_id,
            first_name: Some("Ana".to_string()),
            phone: Some("+15550001111".to_string()),
            status: "new".to_string(),
            ..Default::default()
        };
        Fixture {
            store: Arc::new(InMemoryStore::new()),
            tenant_id,
            lead,
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap()))
    }

    fn executor(store: Arc<InMemoryStore>, sms: MockMessageSender, email: MockEmailSender) -> ActionExecutor {
        ActionExecutor::new(store, Arc::new(sms), Arc::new(email), clock())
    }

    #[tokio::test]
    async fn test_send_sms_uses_templated_message_and_default_number() {
        let f = fixture();
        f.store.set_phone_number(f.tenant_id, "+15559990000").await;

        let mut sms = MockMessageSender::new();
        sms.expect_send_message()
            .withf(|to, from, body| to == "+15550001111" && from == "+15559990000" && body == "Hi Ana")
            .times(1)
            .returning(|_, _, _| SendOutcome::sent("SM1"));

        let exec = executor(f.store.clone(), sms, MockEmailSender::new());
        let ctx = ExecutionContext::new(f.tenant_id, Uuid::new_v4()).with_lead(f.lead.clone());
        let result = exec.execute(&Action::send_sms(1, "Hi {{first_name}}"), &ctx, Uuid::new_v4()).await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.data.unwrap()["message_id"], "SM1");
        assert_eq!(f.store.activities().await.len(), 1);
    }

    #[tokio::test]
    async fn test_send_sms_without_phone_fails() {
        let f = fixture();
        let mut sms = MockMessageSender::new();
        sms.expect_send_message().times(0);

        let exec = executor(f.store.clone(), sms, MockEmailSender::new());
        let lead = Lead {
            phone: None,
            ..f.lead.clone()
        };
        let ctx = ExecutionContext::new(f.tenant_id, Uuid::new_v4()).with_lead(lead);
        let result = exec.execute(&Action::send_sms(1, "Hi"), &ctx, Uuid::new_v4()).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("No phone number available for SMS"));
    }

    #[tokio::test]
    async fn test_provider_failure_becomes_failed_result() {
        let f = fixture();
        f.store.set_phone_number(f.tenant_id, "+15559990000").await;

        let mut sms = MockMessageSender::new();
        sms.expect_send_message()
            .returning(|_, _, _| SendOutcome::failed("carrier rejected"));

        let exec = executor(f.store.clone(), sms, MockEmailSender::new());
        let ctx = ExecutionContext::new(f.tenant_id, Uuid::new_v4()).with_lead(f.lead.clone());
        let result = exec.execute(&Action::send_sms(1, "Hi"), &ctx, Uuid::new_v4()).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("carrier rejected"));
        assert!(f.store.activities().await.is_empty());
    }

    #[tokio::test]
    async fn test_send_email_prefers_contact_address() {
        let f = fixture();
        let account = EmailAccount {
            id: Uuid::new_v4(),
            tenant_id: f.tenant_id,
            email_address: "sales@acme.test".to_string(),
            display_name: None,
            provider: "smtp".to_string(),
        };
        f.store.set_email_account(account).await;

        let mut email = MockEmailSender::new();
        email
            .expect_send_email()
            .withf(|_, e| e.to == "ana@contact.test" && e.subject == "Welcome Ana")
            .times(1)
            .returning(|_, _| SendOutcome::sent("<m1@acme.test>"));

        let exec = executor(f.store.clone(), MockMessageSender::new(), email);
        let ctx = ExecutionContext::new(f.tenant_id, Uuid::new_v4())
            .with_lead(f.lead.clone())
            .with_contact(Contact {
                first_name: Some("Ana".to_string()),
                email: Some("ana@contact.test".to_string()),
                ..Default::default()
            });
        let result = exec
            .execute(&Action::send_email(1, "Welcome {{first_name}}", "Hello"), &ctx, Uuid::new_v4())
            .await;

        assert!(result.success, "{:?}", result.error);
    }

    #[tokio::test]
    async fn test_send_email_requires_connected_account() {
        let f = fixture();
        let mut email = MockEmailSender::new();
        email.expect_send_email().times(0);

        let exec = executor(f.store.clone(), MockMessageSender::new(), email);
        let lead = Lead {
            email: Some("ana@example.com".to_string()),
            ..f.lead.clone()
        };
        let ctx = ExecutionContext::new(f.tenant_id, Uuid::new_v4()).with_lead(lead);
        let result = exec.execute(&Action::send_email(1, "Hi", "Body"), &ctx, Uuid::new_v4()).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("No email account connected for this workspace"));
    }

    #[tokio::test]
    async fn test_create_task_due_date() {
        let f = fixture();
        let exec = executor(f.store.clone(), MockMessageSender::new(), MockEmailSender::new());
        let ctx = ExecutionContext::new(f.tenant_id, Uuid::new_v4()).with_lead(f.lead.clone());

        let result = exec
            .execute(&Action::create_task(1, "Call {{first_name}}", Some(3)), &ctx, Uuid::new_v4())
            .await;
        assert!(result.success, "{:?}", result.error);

        let tasks = f.store.tasks().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Call Ana");
        assert_eq!(tasks[0].due_at, Some(Utc.with_ymd_and_hms(2026, 5, 7, 12, 0, 0).unwrap()));
        assert_eq!(tasks[0].lead_id, Some(f.lead.id));
    }

    #[tokio::test]
    async fn test_create_task_out_of_range_due_date_fails() {
        let f = fixture();
        let exec = executor(f.store.clone(), MockMessageSender::new(), MockEmailSender::new());
        let ctx = ExecutionContext::new(f.tenant_id, Uuid::new_v4()).with_lead(f.lead.clone());

        let result = exec
            .execute(&Action::create_task(1, "Follow up", Some(i64::MAX)), &ctx, Uuid::new_v4())
            .await;

        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("out of range"));
        assert!(f.store.tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_lead_actions_require_lead() {
        let f = fixture();
        let exec = executor(f.store.clone(), MockMessageSender::new(), MockEmailSender::new());
        let ctx = ExecutionContext::new(f.tenant_id, Uuid::new_v4());

        for action in [
            Action::update_status(1, "qualified"),
            Action::create_task(2, "Follow up", None),
            Action::move_lead_stage(3, "proposal"),
            Action::assign_user(4, Uuid::new_v4()),
        ] {
            let result = exec.execute(&action, &ctx, Uuid::new_v4()).await;
            assert!(!result.success, "{} should fail", action.action_type());
            assert_eq!(result.error.as_deref(), Some("No lead in context"));
        }
    }

    #[tokio::test]
    async fn test_update_status_writes_lead() {
        let f = fixture();
        f.store.insert_lead(f.lead.clone()).await;
        let exec = executor(f.store.clone(), MockMessageSender::new(), MockEmailSender::new());
        let ctx = ExecutionContext::new(f.tenant_id, Uuid::new_v4()).with_lead(f.lead.clone());

        let result = exec.execute(&Action::update_status(1, "contacted"), &ctx, Uuid::new_v4()).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(f.store.lead(f.lead.id).await.unwrap().status, "contacted");
    }

    #[tokio::test]
    async fn test_datastore_error_becomes_failed_result() {
        let f = fixture();
        // lead was never stored, so the update finds nothing
        let exec = executor(f.store.clone(), MockMessageSender::new(), MockEmailSender::new());
        let ctx = ExecutionContext::new(f.tenant_id, Uuid::new_v4()).with_lead(f.lead.clone());

        let result = exec.execute(&Action::update_status(1, "contacted"), &ctx, Uuid::new_v4()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_tags_target_lead_first() {
        let f = fixture();
        let exec = executor(f.store.clone(), MockMessageSender::new(), MockEmailSender::new());
        let ctx = ExecutionContext::new(f.tenant_id, Uuid::new_v4()).with_lead(f.lead.clone());

        let first = exec.execute(&Action::add_tag(1, "hot"), &ctx, Uuid::new_v4()).await;
        let second = exec.execute(&Action::add_tag(2, "hot"), &ctx, Uuid::new_v4()).await;
        assert_eq!(first.data.unwrap()["added"], true);
        assert_eq!(second.data.unwrap()["added"], false);

        let removed = exec.execute(&Action::remove_tag(3, "hot"), &ctx, Uuid::new_v4()).await;
        assert_eq!(removed.data.unwrap()["removed"], true);
        assert!(f.store.tags(EntityKind::Lead, f.lead.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_control_flow_kinds_are_benign() {
        let f = fixture();
        let exec = executor(f.store.clone(), MockMessageSender::new(), MockEmailSender::new());
        let ctx = ExecutionContext::new(f.tenant_id, Uuid::new_v4());

        let wait = exec.execute(&Action::wait(1, 2, WaitUnit::Hours), &ctx, Uuid::new_v4()).await;
        assert!(wait.success);

        let condition = Action::condition(2, Default::default(), vec![], vec![]);
        assert!(exec.execute(&condition, &ctx, Uuid::new_v4()).await.success);
    }
}
