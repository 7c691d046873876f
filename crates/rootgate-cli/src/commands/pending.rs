use anyhow::Result;

use rootgate_core::ipc::{send_request, RespondPayload};
use rootgate_core::{ControlRequest, ControlResponse, Decision, RequestId};

use super::Session;

#[derive(Debug)]
pub enum PendingAction {
    List,
    Respond {
        id: RequestId,
        decision: Decision,
        minutes: i64,
    },
}

pub fn execute(session: &Session, action: PendingAction) -> Result<()> {
    let socket = session.control_socket();
    match action {
        PendingAction::List => match send_request(&socket, &ControlRequest::ListPending)? {
            ControlResponse::Pending(requests) if requests.is_empty() => {
                println!("No requests waiting.");
                Ok(())
            }
            ControlResponse::Pending(requests) => {
                for request in requests {
                    println!(
                        "{id}  {name} (uid {uid} pid {pid})  {command}",
                        id = request.id,
                        name = request.display_name,
                        uid = request.uid,
                        pid = request.pid,
                        command = request.command.as_deref().unwrap_or("<shell>"),
                    );
                }
                Ok(())
            }
            ControlResponse::Error(error) => Err(anyhow::anyhow!(error.message)),
            other => Err(anyhow::anyhow!("unexpected response: {other:?}")),
        },
        PendingAction::Respond {
            id,
            decision,
            minutes,
        } => {
            let request = ControlRequest::Respond(RespondPayload {
                id,
                decision,
                minutes,
            });
            match send_request(&socket, &request)? {
                ControlResponse::Responded { decision } => {
                    println!("Request {id} answered: {decision}.");
                    Ok(())
                }
                ControlResponse::Error(error) => Err(anyhow::anyhow!(error.message)),
                other => Err(anyhow::anyhow!("unexpected response: {other:?}")),
            }
        }
    }
}
