use crate::model::leave::{LeaveApplication, LeaveStatus};

/// Outbound message handed to the delivery service.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Delivery is fire-and-forget: callers log failures and carry on.
pub trait Notifier: Send + Sync {
    fn send(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Records outbound mail in the application log instead of delivering it.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        tracing::info!(
            recipient = %notification.recipient,
            subject = %notification.subject,
            "Outbound notification"
        );
        tracing::debug!(body = %notification.body, "Notification body");
        Ok(())
    }
}

/// Sends and swallows the error. Returns whether delivery was accepted.
pub fn deliver(notifier: &dyn Notifier, notification: Notification) -> bool {
    match notifier.send(&notification) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                error = %e,
                recipient = %notification.recipient,
                "Notification delivery failed"
            );
            false
        }
    }
}

pub fn credentials_email(
    recipient: &str,
    employee_name: &str,
    username: &str,
    temporary_password: &str,
    login_url: &str,
) -> Notification {
    Notification {
        recipient: recipient.to_string(),
        subject: "Welcome to Employee Management System - Your Account Details".to_string(),
        body: format!(
            "Dear {employee_name},\n\n\
             Your account has been created. Below are your login credentials:\n\n\
             Username: {username}\n\
             Temporary Password: {temporary_password}\n\n\
             You will be asked to change your password after your first login.\n\
             Login here: {login_url}\n\n\
             Best regards,\nHR Department\n"
        ),
    }
}

pub fn leave_decision_email(recipient: &str, application: &LeaveApplication) -> Notification {
    let outcome = match application.status {
        LeaveStatus::Approved => "approved",
        LeaveStatus::Rejected => "rejected",
        LeaveStatus::Cancelled => "cancelled",
        LeaveStatus::Pending => "pending",
    };
    let mut body = format!(
        "Your leave application #{} for {} to {} ({} days) has been {}.\n",
        application.id,
        application.start_date,
        application.end_date,
        application.total_days,
        outcome
    );
    if !application.approval_comments.is_empty() {
        body.push_str(&format!("\nComments: {}\n", application.approval_comments));
    }

    Notification {
        recipient: recipient.to_string(),
        subject: format!("Leave application {outcome}"),
        body,
    }
}

/// Keeps every message in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub sent: std::sync::Mutex<Vec<Notification>>,
    pub fail: bool,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: std::sync::Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn messages(&self) -> Vec<Notification> {
        self.sent.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("smtp unavailable");
        }
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("recorder poisoned"))?
            .push(notification.clone());
        Ok(())
    }
}
