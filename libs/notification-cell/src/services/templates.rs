use crate::models::{AppointmentDetails, EmailMessage, NotificationEvent};

const SIGNATURE: &str = "Best regards,\nMedical Appointment System";

/// Renders one event into the e-mails it produces, in delivery order.
pub fn render(event: &NotificationEvent) -> Vec<EmailMessage> {
    match event {
        NotificationEvent::AppointmentBooked(details) => {
            vec![booking_confirmation(details), doctor_new_booking(details)]
        }
        NotificationEvent::AppointmentApproved(details) => vec![approval(details)],
        NotificationEvent::AppointmentCancelled {
            details,
            cancellation_reason,
        } => vec![cancellation(details, cancellation_reason.as_deref())],
    }
}

fn schedule_lines(details: &AppointmentDetails) -> String {
    format!(
        "Date: {}\nTime: {} - {}",
        details.date.format("%A, %B %-d, %Y"),
        details.start_time.format("%H:%M"),
        details.end_time.format("%H:%M"),
    )
}

fn booking_confirmation(details: &AppointmentDetails) -> EmailMessage {
    let body = format!(
        "Dear {patient},\n\n\
         Your appointment has been booked successfully.\n\n\
         Doctor: Dr. {doctor}\n\
         Specialization: {specialization}\n\
         {schedule}\n\
         Status: {status}\n\n\
         Your appointment is pending approval. You will receive another e-mail once it is approved.\n\n\
         {SIGNATURE}",
        patient = details.patient_name,
        doctor = details.doctor_name,
        specialization = details.specialization,
        schedule = schedule_lines(details),
        status = details.status.to_uppercase(),
    );

    EmailMessage {
        to: details.patient_email.clone(),
        subject: "Appointment Booking Confirmation".to_string(),
        body,
    }
}

fn doctor_new_booking(details: &AppointmentDetails) -> EmailMessage {
    let body = format!(
        "Dear Dr. {doctor},\n\n\
         A new appointment has been booked with you.\n\n\
         Patient: {patient}\n\
         {schedule}\n\
         Reason: {reason}\n\n\
         {SIGNATURE}",
        doctor = details.doctor_name,
        patient = details.patient_name,
        schedule = schedule_lines(details),
        reason = details.reason.as_deref().unwrap_or("Not specified"),
    );

    EmailMessage {
        to: details.doctor_email.clone(),
        subject: "New Appointment Booking".to_string(),
        body,
    }
}

fn approval(details: &AppointmentDetails) -> EmailMessage {
    let body = format!(
        "Dear {patient},\n\n\
         Your appointment has been approved.\n\n\
         Doctor: Dr. {doctor}\n\
         Specialization: {specialization}\n\
         {schedule}\n\n\
         Please arrive 10 minutes before your scheduled time.\n\n\
         {SIGNATURE}",
        patient = details.patient_name,
        doctor = details.doctor_name,
        specialization = details.specialization,
        schedule = schedule_lines(details),
    );

    EmailMessage {
        to: details.patient_email.clone(),
        subject: "Appointment Approved".to_string(),
        body,
    }
}

fn cancellation(details: &AppointmentDetails, reason: Option<&str>) -> EmailMessage {
    let body = format!(
        "Dear {patient},\n\n\
         Your appointment has been cancelled.\n\n\
         Doctor: Dr. {doctor}\n\
         {schedule}\n\
         Reason: {reason}\n\n\
         You can book a new appointment anytime through our system.\n\n\
         {SIGNATURE}",
        patient = details.patient_name,
        doctor = details.doctor_name,
        schedule = schedule_lines(details),
        reason = reason.filter(|r| !r.trim().is_empty()).unwrap_or("Not specified"),
    );

    EmailMessage {
        to: details.patient_email.clone(),
        subject: "Appointment Cancelled".to_string(),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use uuid::Uuid;

    fn details() -> AppointmentDetails {
        AppointmentDetails {
            appointment_id: Uuid::new_v4(),
            patient_name: "Ada Patient".to_string(),
            patient_email: "ada@example.com".to_string(),
            doctor_name: "Grace Hopper".to_string(),
            doctor_email: "grace@example.com".to_string(),
            specialization: "Cardiology".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            status: "pending".to_string(),
            reason: Some("Chest pain".to_string()),
        }
    }

    #[test]
    fn booking_notifies_patient_then_doctor() {
        let messages = render(&NotificationEvent::AppointmentBooked(details()));

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].to, "ada@example.com");
        assert_eq!(messages[0].subject, "Appointment Booking Confirmation");
        assert!(messages[0].body.contains("Dear Ada Patient"));
        assert!(messages[0].body.contains("Doctor: Dr. Grace Hopper"));
        assert!(messages[0].body.contains("Time: 09:00 - 09:30"));
        assert!(messages[0].body.contains("Status: PENDING"));

        assert_eq!(messages[1].to, "grace@example.com");
        assert_eq!(messages[1].subject, "New Appointment Booking");
        assert!(messages[1].body.contains("Patient: Ada Patient"));
        assert!(messages[1].body.contains("Reason: Chest pain"));
    }

    #[test]
    fn approval_reminds_patient_to_arrive_early() {
        let messages = render(&NotificationEvent::AppointmentApproved(details()));

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].subject, "Appointment Approved");
        assert!(messages[0]
            .body
            .contains("Please arrive 10 minutes before your scheduled time."));
    }

    #[test]
    fn cancellation_without_reason_says_not_specified() {
        let messages = render(&NotificationEvent::AppointmentCancelled {
            details: details(),
            cancellation_reason: Some("   ".to_string()),
        });

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].to, "ada@example.com");
        assert!(messages[0].body.contains("Reason: Not specified"));
        assert!(messages[0].body.contains("Date: Monday, March 2, 2026"));
    }
}
