use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, OrderProvisionedEvent, PaymentReceivedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub payment_received_producer: Vec<EventProducer<PaymentReceivedEvent>>,
    pub order_provisioned_producer: Vec<EventProducer<OrderProvisionedEvent>>,
}

pub struct EventHandlers {
    pub on_payment_received: Option<EventHandler<PaymentReceivedEvent>>,
    pub on_order_provisioned: Option<EventHandler<OrderProvisionedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_payment_received = hooks.on_payment_received.map(|f| EventHandler::new(buffer_size, f));
        let on_order_provisioned = hooks.on_order_provisioned.map(|f| EventHandler::new(buffer_size, f));
        Self { on_payment_received, on_order_provisioned }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_payment_received {
            result.payment_received_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_provisioned {
            result.order_provisioned_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_payment_received {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_order_provisioned {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_payment_received: Option<Handler<PaymentReceivedEvent>>,
    pub on_order_provisioned: Option<Handler<OrderProvisionedEvent>>,
}

impl EventHooks {
    pub fn on_payment_received<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentReceivedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_received = Some(Arc::new(f));
        self
    }

    pub fn on_order_provisioned<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderProvisionedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_provisioned = Some(Arc::new(f));
        self
    }
}
