//! Static table of the analytics edge functions the assistant may call.

use serde::Serialize;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Enum { values: &'static [&'static str] },
    /// Calendar date written as `YYYY-MM-DD`.
    Date,
    Integer { min: Option<i64>, max: Option<i64> },
    StringList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    #[serde(flatten)]
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub slug: &'static str,
    pub verb: HttpVerb,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    /// At least one of these parameters has to be supplied.
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    pub at_least_one_of: &'static [&'static str],
}

impl FunctionSpec {
    pub fn param(&self, name: &str) -> Option<&'static ParamSpec> {
        self.params.iter().find(|param| param.name == name)
    }
}

const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: true,
        description,
    }
}

const fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: false,
        description,
    }
}

const TEXT: ParamKind = ParamKind::String;
const DATE: ParamKind = ParamKind::Date;
const STRINGS: ParamKind = ParamKind::StringList;
const POSITIVE: ParamKind = ParamKind::Integer {
    min: Some(1),
    max: None,
};
const NON_NEGATIVE: ParamKind = ParamKind::Integer {
    min: Some(0),
    max: None,
};
const RATING: ParamKind = ParamKind::Integer {
    min: Some(1),
    max: Some(5),
};
const INTERVAL: ParamKind = ParamKind::Enum {
    values: &["day", "week", "month"],
};
const SORT_ORDER: ParamKind = ParamKind::Enum {
    values: &["asc", "desc"],
};
const LINE_ITEM_METRIC: ParamKind = ParamKind::Enum {
    values: &["product", "variant", "vendor"],
};

const START: ParamSpec = required("start_date", DATE, "Start of the period (YYYY-MM-DD)");
const END: ParamSpec = required("end_date", DATE, "End of the period (YYYY-MM-DD)");
const START_OPT: ParamSpec = optional("start_date", DATE, "Start of the period (YYYY-MM-DD)");
const END_OPT: ParamSpec = optional("end_date", DATE, "End of the period (YYYY-MM-DD)");

const fn function(
    name: &'static str,
    slug: &'static str,
    verb: HttpVerb,
    description: &'static str,
    params: &'static [ParamSpec],
) -> FunctionSpec {
    FunctionSpec {
        name,
        slug,
        verb,
        description,
        params,
        at_least_one_of: &[],
    }
}

pub static CATALOG: &[FunctionSpec] = &[
    function(
        "getOrdersOverTime",
        "get-orders-over-time",
        HttpVerb::Post,
        "Order count and revenue bucketed by day, week or month",
        &[
            required("interval", INTERVAL, "Bucket size"),
            START,
            END,
            optional("currency", TEXT, "ISO currency code to report in"),
        ],
    ),
    function(
        "getOrdersByStatus",
        "get-orders-by-status",
        HttpVerb::Post,
        "Orders broken down by financial or fulfillment status",
        &[
            required("status_type", TEXT, "Status dimension, e.g. financial or fulfillment"),
            START_OPT,
            END_OPT,
            optional("currency", TEXT, "ISO currency code to report in"),
        ],
    ),
    function(
        "fetchLatestOkendoReviews",
        "okendo-review-query",
        HttpVerb::Get,
        "Most recent Okendo product reviews",
        &[
            optional("limit", POSITIVE, "Maximum number of reviews"),
            optional("offset", NON_NEGATIVE, "Number of reviews to skip"),
            optional("sort_by", TEXT, "Field to sort on"),
            optional("order", SORT_ORDER, "Sort direction"),
        ],
    ),
    function(
        "getReviewsByRatingRange",
        "get-reviews-by-rating-range",
        HttpVerb::Get,
        "Reviews whose star rating falls in a range",
        &[
            required("min_rating", RATING, "Lowest rating, 1-5"),
            required("max_rating", RATING, "Highest rating, 1-5"),
        ],
    ),
    function(
        "getReviewsByKeyword",
        "get-reviews-by-keyword",
        HttpVerb::Get,
        "Reviews mentioning a keyword",
        &[required("keyword", TEXT, "Word or phrase to search for")],
    ),
    function(
        "getReviewsByDateRange",
        "get-reviews-by-date-range",
        HttpVerb::Post,
        "Reviews submitted within a date range",
        &[START, END],
    ),
    function(
        "getReviewSummaryByProductName",
        "get-review-summary-by-product-name",
        HttpVerb::Get,
        "Aggregated review statistics for one product",
        &[required("product_name", TEXT, "Product title as shown in the store")],
    ),
    function(
        "getSentimentSummary",
        "get-reviews-by-sentiment",
        HttpVerb::Post,
        "Positive, neutral and negative review sentiment",
        &[
            optional("range", TEXT, "Named period such as last_30_days"),
            START_OPT,
            END_OPT,
        ],
    ),
    function(
        "getOrderDetails",
        "get-order-details",
        HttpVerb::Post,
        "Full details of a single order",
        &[required("order_id", TEXT, "Shopify order id or order name")],
    ),
    function(
        "getTopProducts",
        "get-top-products",
        HttpVerb::Get,
        "Best-selling products",
        &[optional("limit", POSITIVE, "Number of products to return")],
    ),
    function(
        "getLineItemAggregates",
        "get-line-item-aggregates",
        HttpVerb::Post,
        "Line item totals grouped by product, variant or vendor",
        &[
            START,
            END,
            optional("metric", LINE_ITEM_METRIC, "Grouping dimension"),
            optional("limit", POSITIVE, "Number of groups to return"),
        ],
    ),
    function(
        "getDiscountUsage",
        "get-discount-usage",
        HttpVerb::Post,
        "Usage statistics for discount codes",
        &[],
    ),
    function(
        "getOrdersWithDiscounts",
        "get-orders-with-discounts",
        HttpVerb::Get,
        "Orders that applied a discount",
        &[],
    ),
    function(
        "getCustomers",
        "get-customers",
        HttpVerb::Get,
        "Customer list",
        &[],
    ),
    function(
        "getInactiveCustomers",
        "get-inactive-customers",
        HttpVerb::Get,
        "Customers without an order in the given number of days",
        &[optional("days", POSITIVE, "Inactivity threshold in days")],
    ),
    FunctionSpec {
        at_least_one_of: &["email", "customer_id"],
        ..function(
            "getCustomerOrders",
            "get-customer-orders",
            HttpVerb::Get,
            "Orders placed by one customer",
            &[
                optional("email", TEXT, "Customer email"),
                optional("customer_id", TEXT, "Shopify customer id"),
            ],
        )
    },
    function(
        "getPostPurchaseInsights",
        "analyze-post-purchase-feedback",
        HttpVerb::Post,
        "Answers a question about post-purchase survey responses",
        &[
            required("question", TEXT, "Question to answer from the survey data"),
            START_OPT,
            END_OPT,
        ],
    ),
    function(
        "getCustomersStats",
        "get-customers-stats",
        HttpVerb::Post,
        "Aggregate customer statistics",
        &[
            optional("metric", TEXT, "Statistic to compute"),
            optional("field", TEXT, "Customer field the statistic applies to"),
            optional("from", DATE, "Start of the period (YYYY-MM-DD)"),
            optional("to", DATE, "End of the period (YYYY-MM-DD)"),
        ],
    ),
    function(
        "getTopCustomersRepeatFrequency",
        "get-top-customers-repeat-frequency",
        HttpVerb::Post,
        "Top customers with how often they reorder",
        &[
            optional("top_n", POSITIVE, "Number of customers to return"),
            START_OPT,
            END_OPT,
            optional("customer_emails", STRINGS, "Restrict to these customers"),
        ],
    ),
    function(
        "orchestrator",
        "orchestrator",
        HttpVerb::Post,
        "Free-form natural language analytics query",
        &[required("query", TEXT, "The question in plain language")],
    ),
    function(
        "getEventCounts",
        "get-event-counts",
        HttpVerb::Post,
        "Klaviyo event counts by type",
        &[START, END],
    ),
    function(
        "getEmailEventRatios",
        "get-email-click-ratio",
        HttpVerb::Post,
        "Email open and click ratios",
        &[START, END],
    ),
    function(
        "getTopClickedUrls",
        "get-top-clicked-urls",
        HttpVerb::Post,
        "Most clicked links in email campaigns",
        &[START, END, optional("limit", POSITIVE, "Number of URLs to return")],
    ),
    function(
        "getCampaignReasoning",
        "campaign_reasoning",
        HttpVerb::Post,
        "Explains the engagement of email campaigns",
        &[START, END, optional("campaign_id", TEXT, "Restrict to one campaign")],
    ),
    function(
        "getEventLogSlice",
        "get-event-log-slice",
        HttpVerb::Post,
        "Raw Klaviyo event log entries",
        &[
            START,
            END,
            optional("event_type", TEXT, "Event type filter"),
            optional("email", TEXT, "Profile email filter"),
            optional("limit", POSITIVE, "Number of events to return"),
        ],
    ),
];

pub fn find(name: &str) -> Option<&'static FunctionSpec> {
    CATALOG.iter().find(|spec| spec.name == name)
}
