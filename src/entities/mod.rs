pub mod award;
pub mod integration_watermark;
pub mod purchase_order;
pub mod purchase_order_line;
pub mod purchase_request;
pub mod purchase_request_item;
pub mod quote;
pub mod quote_item;
pub mod rfq;
pub mod rfq_item;
pub mod rfq_item_supplier;
pub mod rfq_supplier_invite;
pub mod status_event;
pub mod sync_run;
pub mod tenant;
