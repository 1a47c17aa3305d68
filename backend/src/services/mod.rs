// Collaborators the workflow engine talks to: clock, SMS, email.

pub mod clock;
pub mod email;
pub mod messaging;

pub use clock::{Clock, ManualClock, SystemClock};
pub use email::{EmailSender, LogOnlyEmailSender, OutgoingEmail, SmtpEmailSender};
pub use messaging::{HttpSmsSender, LogOnlySender, MessageSender, SendOutcome};

#[cfg(test)]
pub use email::MockEmailSender;
#[cfg(test)]
pub use messaging::MockMessageSender;
