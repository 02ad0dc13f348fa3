use crate::events::{
    AppartementCreatedEvent, NullEvent, ReservationCreatedEvent, UserCreatedEvent,
    UserDeletedEvent, UserUpdatedEvent,
};
use crate::handlers::{
    AppartementCreatedHandler, NullEventHandler, ReservationCreatedHandler, UserCreatedHandler,
    UserDeletedHandler, UserUpdatedHandler,
};
use crate::store::StayinWork;
use stayin_eventing::error::EventingResult;
use stayin_eventing::eventing::Catalog;

/// 构建 Stayin 的完整事件目录
pub fn stayin_catalog<W: StayinWork + 'static>() -> EventingResult<Catalog<W>> {
    let catalog = Catalog::new();

    catalog.register::<UserCreatedEvent, _>(UserCreatedHandler)?;
    catalog.register::<UserUpdatedEvent, _>(UserUpdatedHandler)?;
    catalog.register::<UserDeletedEvent, _>(UserDeletedHandler)?;
    catalog.register::<AppartementCreatedEvent, _>(AppartementCreatedHandler)?;
    catalog.register::<ReservationCreatedEvent, _>(ReservationCreatedHandler)?;
    catalog.register::<NullEvent, _>(NullEventHandler)?;

    Ok(catalog)
}
