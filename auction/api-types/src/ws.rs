use {
    crate::{
        Amount,
        BidderId,
        Lot,
        LotId,
    },
    serde::{
        Deserialize,
        Serialize,
    },
    time::OffsetDateTime,
    utoipa::ToSchema,
};

/// Messages a connected client may send. Bid submission is
/// fire-and-forget: there is no per-message acknowledgment, and a
/// successful bid is only observed through the `UPDATE_BID` broadcast.
#[derive(Serialize, Deserialize, ToSchema, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "BID_PLACED")]
    BidPlaced {
        #[serde(rename = "itemId")]
        #[schema(example = "item-1")]
        item_id:   LotId,
        #[schema(example = 60)]
        amount:    Amount,
        #[serde(rename = "bidderId")]
        #[schema(example = "bidder-x1y2z3")]
        bidder_id: BidderId,
    },
}

/// Why a bid was turned down. `OUTBID` covers both "not above the
/// floor" and "lost the race to a just-accepted higher bid"; clients
/// receive the committed amount either way and cannot tell the two
/// apart.
#[derive(Serialize, Deserialize, ToSchema, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    #[serde(rename = "INVALID_ITEM")]
    InvalidItem,
    #[serde(rename = "AUCTION_ENDED")]
    AuctionEnded,
    #[serde(rename = "OUTBID")]
    Outbid,
}

/// Events the server pushes to clients. `UPDATE_BID` and
/// `AUCTIONS_RESET` go to every connected observer; `BID_REJECTED` goes
/// only to the connection that submitted the bid.
#[derive(Serialize, Deserialize, ToSchema, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ServerUpdateResponse {
    #[serde(rename = "UPDATE_BID")]
    UpdateBid {
        #[serde(rename = "itemId")]
        item_id:   LotId,
        amount:    Amount,
        #[serde(rename = "bidderId")]
        bidder_id: BidderId,
        #[serde(rename = "endTime", with = "crate::serde::timestamp_ms")]
        #[schema(value_type = i64)]
        end_time:  OffsetDateTime,
    },
    #[serde(rename = "BID_REJECTED")]
    BidRejected {
        /// None when the offending frame was too malformed to name a lot.
        #[serde(rename = "itemId")]
        item_id:     Option<LotId>,
        reason:      RejectReason,
        #[serde(
            rename = "currentBid",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        current_bid: Option<Amount>,
    },
    #[serde(rename = "AUCTIONS_RESET")]
    AuctionsReset {
        items:       Vec<Lot>,
        #[serde(rename = "serverTime", with = "crate::serde::timestamp_ms")]
        #[schema(value_type = i64)]
        server_time: OffsetDateTime,
    },
}
