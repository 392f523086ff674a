// Core data types flowing through the pipeline.

use serde::{Deserialize, Serialize};

/// A single rental offer as returned by a sourcing service.
/// Immutable once produced; `url` is the unique identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub url: String,
    pub price: u64,
    pub brand: String,
}

/// One user's in-flight request. The payload type changes as the context
/// moves through the stages: source names in, offers mid-flight, a booking
/// outcome out. Each queue hand-off moves the context, so exactly one stage
/// owns it at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineContext<T> {
    pub user_id: u64,
    pub payload: T,
}

impl<T> PipelineContext<T> {
    pub fn new(user_id: u64, payload: T) -> Self {
        Self { user_id, payload }
    }

    /// Hand the context onward with a transformed payload.
    pub fn with_payload<U>(self, payload: U) -> PipelineContext<U> {
        PipelineContext {
            user_id: self.user_id,
            payload,
        }
    }
}

/// Result of the booking stage for one context: the single winning offer,
/// or an explicit marker that nothing was booked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingOutcome {
    Booked(Offer),
    NotBooked,
}

impl BookingOutcome {
    pub fn offer(&self) -> Option<&Offer> {
        match self {
            BookingOutcome::Booked(offer) => Some(offer),
            BookingOutcome::NotBooked => None,
        }
    }

    pub fn is_booked(&self) -> bool {
        matches!(self, BookingOutcome::Booked(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_record_form() {
        let offer = Offer {
            url: "http://svcA/car?id=1".to_string(),
            price: 1000,
            brand: "LADA".to_string(),
        };

        let value = serde_json::to_value(&offer).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "url": "http://svcA/car?id=1",
                "price": 1000,
                "brand": "LADA",
            })
        );

        let parsed: Offer = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, offer);
    }

    #[test]
    fn with_payload_keeps_user_id() {
        let ctx = PipelineContext::new(7, vec!["svcA".to_string()]);
        let ctx = ctx.with_payload(42usize);
        assert_eq!(ctx.user_id, 7);
        assert_eq!(ctx.payload, 42);
    }

    #[test]
    fn outcome_accessors() {
        let offer = Offer {
            url: "http://svcA/car?id=3".to_string(),
            price: 3000,
            brand: "KIA".to_string(),
        };
        let booked = BookingOutcome::Booked(offer.clone());
        assert!(booked.is_booked());
        assert_eq!(booked.offer(), Some(&offer));
        assert_eq!(BookingOutcome::NotBooked.offer(), None);
    }
}
