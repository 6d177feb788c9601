//! Recording fake of the remote boundary, shared by the orchestration tests.
//!
//! The fake records every call in order, which is what the ordering and
//! funded-gate tests assert against. Behavior is programmable per method:
//! queued grant responses, queued outgoing-payment states (the last one
//! repeats), and injectable failures for the cleanup steps.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;

use crate::amount::Amount;
use crate::client::{
    ClientError, IncomingPaymentRequest, OpenPayments, OutgoingPaymentRequest, QuoteRequest,
};
use crate::grant::{
    AccessToken, FinalizedGrant, GrantContinuation, GrantRequest, GrantResponse, InteractUris,
    PendingGrant,
};
use crate::payment::{IncomingPayment, OutgoingPayment, Quote};
use crate::wallet::WalletAddress;

/// One recorded call against the fake.
#[derive(Debug, Clone)]
pub(crate) enum Call {
    GetWalletAddress(Url),
    RequestGrant {
        auth_server: Url,
        request: GrantRequest,
    },
    ContinueGrant,
    CancelGrant,
    CreateIncomingPayment {
        resource_server: Url,
        request: IncomingPaymentRequest,
    },
    CompleteIncomingPayment(Url),
    CreateQuote {
        resource_server: Url,
        request: QuoteRequest,
    },
    CreateOutgoingPayment {
        resource_server: Url,
        request: OutgoingPaymentRequest,
    },
    GetOutgoingPayment(Url),
}

#[derive(Default)]
pub(crate) struct FakeClient {
    calls: Mutex<Vec<Call>>,
    wallets: Mutex<HashMap<Url, WalletAddress>>,
    grant_responses: Mutex<VecDeque<GrantResponse>>,
    continue_responses: Mutex<VecDeque<GrantResponse>>,
    outgoing_states: Mutex<VecDeque<OutgoingPayment>>,
    quote_error: Mutex<Option<String>>,
    complete_error: Mutex<Option<String>>,
    cancel_error: Mutex<Option<String>>,
}

impl FakeClient {
    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub(crate) fn add_wallet(&self, wallet: WalletAddress) {
        self.wallets.lock().unwrap().insert(wallet.id.clone(), wallet);
    }

    pub(crate) fn push_grant_response(&self, response: GrantResponse) {
        self.grant_responses.lock().unwrap().push_back(response);
    }

    pub(crate) fn push_continue_response(&self, response: GrantResponse) {
        self.continue_responses.lock().unwrap().push_back(response);
    }

    pub(crate) fn push_outgoing_state(&self, state: OutgoingPayment) {
        self.outgoing_states.lock().unwrap().push_back(state);
    }

    pub(crate) fn fail_create_quote(&self, message: &str) {
        *self.quote_error.lock().unwrap() = Some(message.to_owned());
    }

    pub(crate) fn fail_complete_incoming_payment(&self, message: &str) {
        *self.complete_error.lock().unwrap() = Some(message.to_owned());
    }

    pub(crate) fn fail_cancel_grant(&self, message: &str) {
        *self.cancel_error.lock().unwrap() = Some(message.to_owned());
    }
}

fn remote_error(message: impl Into<String>) -> ClientError {
    message.into().into()
}

#[async_trait]
impl OpenPayments for FakeClient {
    async fn get_wallet_address(&self, url: &Url) -> Result<WalletAddress, ClientError> {
        self.record(Call::GetWalletAddress(url.clone()));
        self.wallets
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| remote_error(format!("no wallet at {url}")))
    }

    async fn request_grant(
        &self,
        auth_server: &Url,
        request: GrantRequest,
    ) -> Result<GrantResponse, ClientError> {
        self.record(Call::RequestGrant {
            auth_server: auth_server.clone(),
            request: request.clone(),
        });
        if let Some(scripted) = self.grant_responses.lock().unwrap().pop_front() {
            return Ok(scripted);
        }
        // Unscripted: answer the shape the access type calls for.
        if request.interact.is_some() {
            Ok(GrantResponse::Pending(pending_grant("cont-default")))
        } else {
            Ok(GrantResponse::Finalized(finalized_grant("tok-default")))
        }
    }

    async fn continue_grant(
        &self,
        _continuation: &GrantContinuation,
        _interact_ref: &str,
    ) -> Result<GrantResponse, ClientError> {
        self.record(Call::ContinueGrant);
        if let Some(scripted) = self.continue_responses.lock().unwrap().pop_front() {
            return Ok(scripted);
        }
        Ok(GrantResponse::Finalized(finalized_grant("tok-continued")))
    }

    async fn cancel_grant(&self, _continuation: &GrantContinuation) -> Result<(), ClientError> {
        self.record(Call::CancelGrant);
        match self.cancel_error.lock().unwrap().as_ref() {
            Some(message) => Err(remote_error(message.clone())),
            None => Ok(()),
        }
    }

    async fn create_incoming_payment(
        &self,
        resource_server: &Url,
        _access_token: &str,
        request: IncomingPaymentRequest,
    ) -> Result<IncomingPayment, ClientError> {
        self.record(Call::CreateIncomingPayment {
            resource_server: resource_server.clone(),
            request: request.clone(),
        });
        Ok(IncomingPayment {
            id: resource_server.join("incoming-payments/ip-1").unwrap(),
            wallet_address: request.wallet_address,
            completed: false,
            expires_at: Some(request.expires_at),
            metadata: request.metadata,
        })
    }

    async fn complete_incoming_payment(
        &self,
        payment_id: &Url,
        _access_token: &str,
    ) -> Result<(), ClientError> {
        self.record(Call::CompleteIncomingPayment(payment_id.clone()));
        match self.complete_error.lock().unwrap().as_ref() {
            Some(message) => Err(remote_error(message.clone())),
            None => Ok(()),
        }
    }

    async fn create_quote(
        &self,
        resource_server: &Url,
        _access_token: &str,
        request: QuoteRequest,
    ) -> Result<Quote, ClientError> {
        self.record(Call::CreateQuote {
            resource_server: resource_server.clone(),
            request: request.clone(),
        });
        if let Some(message) = self.quote_error.lock().unwrap().as_ref() {
            return Err(remote_error(message.clone()));
        }
        Ok(Quote {
            id: resource_server.join("quotes/q-1").unwrap(),
            wallet_address: request.wallet_address,
            receiver: request.receiver,
            method: request.method,
            debit_amount: request.debit_amount,
            receive_amount: Amount::new("950", "EUR", 2),
            expires_at: None,
        })
    }

    async fn create_outgoing_payment(
        &self,
        resource_server: &Url,
        _access_token: &str,
        request: OutgoingPaymentRequest,
    ) -> Result<OutgoingPayment, ClientError> {
        self.record(Call::CreateOutgoingPayment {
            resource_server: resource_server.clone(),
            request: request.clone(),
        });
        Ok(OutgoingPayment {
            id: resource_server.join("outgoing-payments/op-1").unwrap(),
            wallet_address: request.wallet_address,
            quote_id: Some(request.quote_id),
            failed: false,
            sent_amount: Amount::new("0", "USD", 2),
            metadata: request.metadata,
        })
    }

    async fn get_outgoing_payment(
        &self,
        payment_id: &Url,
        _access_token: &str,
    ) -> Result<OutgoingPayment, ClientError> {
        self.record(Call::GetOutgoingPayment(payment_id.clone()));
        let mut states = self.outgoing_states.lock().unwrap();
        let state = if states.len() > 1 {
            states.pop_front().unwrap()
        } else if let Some(last) = states.front() {
            last.clone()
        } else {
            outgoing_payment("1", false)
        };
        Ok(state)
    }
}

/// A fresh fake behind an [`Arc`], ready to be coerced into a
/// [`SharedClient`](crate::client::SharedClient).
pub(crate) fn fake_client() -> Arc<FakeClient> {
    Arc::new(FakeClient::default())
}

/// A wallet with auth and resource servers derived from its id.
pub(crate) fn wallet(id: &str, asset_code: &str, asset_scale: u8) -> WalletAddress {
    WalletAddress {
        id: id.parse().unwrap(),
        asset_code: asset_code.to_owned(),
        asset_scale,
        auth_server: format!("{id}/auth/").parse().unwrap(),
        resource_server: format!("{id}/rs/").parse().unwrap(),
        public_name: None,
    }
}

/// A finalized grant that retains a continuation handle for revocation.
pub(crate) fn finalized_grant(token: &str) -> FinalizedGrant {
    FinalizedGrant {
        access_token: AccessToken::new(token),
        continuation: Some(GrantContinuation {
            uri: "https://auth.example/continue/fin".parse().unwrap(),
            access_token: AccessToken::new("cont-manage"),
            wait: None,
        }),
    }
}

/// A pending grant with a fixed interact redirect.
pub(crate) fn pending_grant(continuation_token: &str) -> PendingGrant {
    PendingGrant {
        interact: InteractUris {
            redirect: "https://auth.example/interact/1".parse().unwrap(),
            finish: Some("finish-hash".to_owned()),
        },
        continuation: GrantContinuation {
            uri: "https://auth.example/continue/1".parse().unwrap(),
            access_token: AccessToken::new(continuation_token),
            wait: Some(30),
        },
        nonce: String::new(),
    }
}

/// An outgoing-payment state for the settlement watch to observe.
pub(crate) fn outgoing_payment(sent_value: &str, failed: bool) -> OutgoingPayment {
    OutgoingPayment {
        id: "https://wallet.example/alice/rs/outgoing-payments/op-1"
            .parse()
            .unwrap(),
        wallet_address: "https://wallet.example/alice".parse().unwrap(),
        quote_id: None,
        failed,
        sent_amount: Amount::new(sent_value, "USD", 2),
        metadata: None,
    }
}
