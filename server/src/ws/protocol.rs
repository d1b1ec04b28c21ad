use crate::hub::{Broadcast, ConnHandle, Event, Hub, HubError};
use crate::proto::{AuthenticatedPayload, ClientMessage, Confirmation, ServerMessage};

/// Handle one inbound text frame. Returns the replies owed to the sender, in
/// the order they must be sent.
pub fn handle_text_message(text: &str, handle: ConnHandle, hub: &Hub) -> Vec<ServerMessage> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(err) => {
            tracing::warn!(
                connection = %handle,
                error = %err,
                "Failed to decode client frame"
            );
            return vec![ServerMessage::error(format!("Invalid message: {}", err))];
        }
    };

    tracing::debug!(connection = %handle, event = message.name(), "Client frame received");
    dispatch_message(message, handle, hub)
}

/// Dispatch a decoded frame to the hub.
pub fn dispatch_message(message: ClientMessage, handle: ConnHandle, hub: &Hub) -> Vec<ServerMessage> {
    match message {
        ClientMessage::Authenticate(identity) => {
            let reply = match hub.authenticate(handle, identity) {
                Ok(outcome) => AuthenticatedPayload {
                    success: true,
                    user: Some(outcome.identity),
                    connected_users: outcome.connected_users,
                    error: None,
                },
                Err(err) => {
                    tracing::warn!(connection = %handle, error = %err, "Authentication rejected");
                    AuthenticatedPayload {
                        success: false,
                        user: None,
                        connected_users: hub.presence().total,
                        error: Some(err.to_string()),
                    }
                }
            };
            vec![ServerMessage::Authenticated(reply)]
        }
        ClientMessage::SendTestMessage(request) => {
            let event = Event::BroadcastMessage(Broadcast {
                message: request.message,
                target_role: request.target_role,
            });
            let result = hub.submit(handle, event);
            log_rejection(handle, "sendTestMessage", &result);
            vec![ServerMessage::MessageSent(Confirmation::from_result(&result, None))]
        }
        ClientMessage::SendOrderNotification(order) => {
            let order_id = order.order_id.clone();
            let result = hub.submit(handle, Event::OrderCreated(order));
            log_rejection(handle, "sendOrderNotification", &result);

            let mut replies = vec![ServerMessage::OrderNotificationSent(Confirmation::from_result(
                &result,
                Some(order_id.clone()),
            ))];
            if result.is_ok() {
                replies.push(ServerMessage::RiderNotificationSent(Confirmation::from_result(
                    &result,
                    Some(order_id),
                )));
            }
            replies
        }
        ClientMessage::UpdateOrderStatus(request) => {
            let order_id = request.order_id.clone();
            let result = hub
                .submitter(handle)
                .and_then(|source| hub.update_order_status(&source, request));
            log_rejection(handle, "updateOrderStatus", &result);
            vec![ServerMessage::StatusUpdateSent(Confirmation::from_result(
                &result,
                Some(order_id),
            ))]
        }
    }
}

fn log_rejection<T>(handle: ConnHandle, event: &str, result: &Result<T, HubError>) {
    if let Err(err) = result {
        tracing::warn!(connection = %handle, event, error = %err, "Submission rejected");
    }
}
