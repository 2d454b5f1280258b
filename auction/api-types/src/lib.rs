use {
    ::serde::{
        Deserialize,
        Serialize,
    },
    time::OffsetDateTime,
    utoipa::{
        ToResponse,
        ToSchema,
    },
};

pub mod serde;
pub mod ws;

pub type LotId = String;
pub type BidderId = String;
pub type Amount = u64;

/// A single auction lot as seen on the wire.
///
/// `endTime` is the server-clock close time in Unix milliseconds; once
/// it passes, the lot stays frozen until the next reset.
#[derive(Serialize, Deserialize, ToSchema, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Lot {
    #[schema(example = "item-1")]
    pub id:             LotId,
    #[schema(example = "Vintage Camera")]
    pub title:          String,
    /// The bid floor set at creation; `currentBid` starts here and
    /// returns here on reset.
    #[schema(example = 50)]
    pub starting_price: Amount,
    #[schema(example = 60)]
    pub current_bid:    Amount,
    /// The bidder whose bid was accepted most recently, if any.
    #[schema(example = "bidder-x1y2z3", value_type = Option<String>)]
    pub highest_bidder: Option<BidderId>,
    #[serde(with = "crate::serde::timestamp_ms")]
    #[schema(example = 1700000600000i64, value_type = i64)]
    pub end_time:       OffsetDateTime,
}

/// Catalog snapshot returned by `GET /items`.
///
/// `serverTime` lets clients compute `offset = serverTime - localTime`
/// once on fetch and derive every countdown from `localTime + offset`,
/// so unsynchronized local clocks never skew the displayed remaining
/// time.
#[derive(Serialize, Deserialize, ToSchema, ToResponse, Clone, Debug, PartialEq)]
#[response(description = "The full lot catalog and the current server clock")]
#[serde(rename_all = "camelCase")]
pub struct CatalogResponse {
    pub items:       Vec<Lot>,
    #[serde(with = "crate::serde::timestamp_ms")]
    #[schema(example = 1700000000000i64, value_type = i64)]
    pub server_time: OffsetDateTime,
}

#[derive(ToResponse, ToSchema, Serialize, Deserialize)]
#[response(description = "An error occurred processing the request")]
pub struct ErrorBodyResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        serde_json::json,
    };

    #[test]
    fn lot_uses_original_wire_field_names() {
        let lot = Lot {
            id:             "item-1".to_string(),
            title:          "Vintage Camera".to_string(),
            starting_price: 50,
            current_bid:    60,
            highest_bidder: Some("bidder-a".to_string()),
            end_time:       OffsetDateTime::from_unix_timestamp(1_700_000_600).unwrap(),
        };
        assert_eq!(
            serde_json::to_value(&lot).unwrap(),
            json!({
                "id": "item-1",
                "title": "Vintage Camera",
                "startingPrice": 50,
                "currentBid": 60,
                "highestBidder": "bidder-a",
                "endTime": 1_700_000_600_000i64,
            })
        );
    }

    #[test]
    fn fresh_lot_serializes_null_highest_bidder() {
        let lot = Lot {
            id:             "item-2".to_string(),
            title:          "Signed Vinyl".to_string(),
            starting_price: 30,
            current_bid:    30,
            highest_bidder: None,
            end_time:       OffsetDateTime::from_unix_timestamp(1_700_000_720).unwrap(),
        };
        assert_eq!(
            serde_json::to_value(&lot).unwrap()["highestBidder"],
            serde_json::Value::Null
        );
    }

    #[test]
    fn catalog_response_round_trips_server_time_as_millis() {
        let response = CatalogResponse {
            items:       vec![],
            server_time: OffsetDateTime::from_unix_timestamp_nanos(1_700_000_000_123_000_000)
                .unwrap(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["serverTime"], json!(1_700_000_000_123i64));
        let parsed: CatalogResponse = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, response);
    }
}
