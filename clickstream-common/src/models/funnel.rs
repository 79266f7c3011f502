//! Marketing funnel stages and conversion goals.

use serde::{Deserialize, Serialize};

/// Fixed, totally ordered lifecycle stages. The current stage of a session
/// only ever moves toward `Advocacy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    Awareness,
    Interest,
    Consideration,
    Intent,
    Evaluation,
    Purchase,
    Retention,
    Advocacy,
}

impl FunnelStage {
    pub const ORDER: [FunnelStage; 8] = [
        FunnelStage::Awareness,
        FunnelStage::Interest,
        FunnelStage::Consideration,
        FunnelStage::Intent,
        FunnelStage::Evaluation,
        FunnelStage::Purchase,
        FunnelStage::Retention,
        FunnelStage::Advocacy,
    ];

    pub fn first() -> Self {
        FunnelStage::Awareness
    }

    pub fn index(&self) -> usize {
        match self {
            FunnelStage::Awareness => 0,
            FunnelStage::Interest => 1,
            FunnelStage::Consideration => 2,
            FunnelStage::Intent => 3,
            FunnelStage::Evaluation => 4,
            FunnelStage::Purchase => 5,
            FunnelStage::Retention => 6,
            FunnelStage::Advocacy => 7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FunnelStage::Awareness => "awareness",
            FunnelStage::Interest => "interest",
            FunnelStage::Consideration => "consideration",
            FunnelStage::Intent => "intent",
            FunnelStage::Evaluation => "evaluation",
            FunnelStage::Purchase => "purchase",
            FunnelStage::Retention => "retention",
            FunnelStage::Advocacy => "advocacy",
        }
    }

    /// Percent of the funnel traversed when this is the current stage.
    pub fn completion_percent(&self) -> u8 {
        let last = Self::ORDER.len() - 1;
        ((self.index() as f64 / last as f64) * 100.0).round() as u8
    }
}

/// Business conversion goals, each with a default value in currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionGoal {
    QuoteRequest,
    ContactForm,
    PhoneCall,
    EmailContact,
    ConsultationBooking,
    ProductInquiry,
    NewsletterSignup,
    BrochureDownload,
    VirtualConsultation,
    ShowroomVisit,
}

impl ConversionGoal {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionGoal::QuoteRequest => "quote_request",
            ConversionGoal::ContactForm => "contact_form",
            ConversionGoal::PhoneCall => "phone_call",
            ConversionGoal::EmailContact => "email_contact",
            ConversionGoal::ConsultationBooking => "consultation_booking",
            ConversionGoal::ProductInquiry => "product_inquiry",
            ConversionGoal::NewsletterSignup => "newsletter_signup",
            ConversionGoal::BrochureDownload => "brochure_download",
            ConversionGoal::VirtualConsultation => "virtual_consultation",
            ConversionGoal::ShowroomVisit => "showroom_visit",
        }
    }

    pub fn default_value(&self) -> f64 {
        match self {
            ConversionGoal::QuoteRequest => 50.0,
            ConversionGoal::ContactForm => 25.0,
            ConversionGoal::PhoneCall => 75.0,
            ConversionGoal::EmailContact => 30.0,
            ConversionGoal::ConsultationBooking => 100.0,
            ConversionGoal::ProductInquiry => 40.0,
            ConversionGoal::NewsletterSignup => 10.0,
            ConversionGoal::BrochureDownload => 15.0,
            ConversionGoal::VirtualConsultation => 80.0,
            ConversionGoal::ShowroomVisit => 120.0,
        }
    }

    /// Reporting bucket for the goal.
    pub fn conversion_type(&self) -> &'static str {
        match self {
            ConversionGoal::QuoteRequest
            | ConversionGoal::ContactForm
            | ConversionGoal::PhoneCall
            | ConversionGoal::EmailContact
            | ConversionGoal::ConsultationBooking
            | ConversionGoal::ProductInquiry => "lead",
            ConversionGoal::NewsletterSignup | ConversionGoal::BrochureDownload => "engagement",
            ConversionGoal::VirtualConsultation | ConversionGoal::ShowroomVisit => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_matches_indices() {
        for (i, stage) in FunnelStage::ORDER.iter().enumerate() {
            assert_eq!(stage.index(), i);
        }
    }

    #[test]
    fn completion_endpoints() {
        assert_eq!(FunnelStage::Awareness.completion_percent(), 0);
        assert_eq!(FunnelStage::Advocacy.completion_percent(), 100);
        // 3 of 7 steps traversed
        assert_eq!(FunnelStage::Intent.completion_percent(), 43);
    }
}
