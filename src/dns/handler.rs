//! Per-message query handling and answer synthesis.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, error};
use trust_dns_proto::rr::rdata::SOA;
use trust_dns_server::authority::MessageResponseBuilder;
use trust_dns_server::client::op::{Header, MessageType, OpCode, ResponseCode};
use trust_dns_server::client::rr::rdata::TXT;
use trust_dns_server::client::rr::{DNSClass, Name, RData, Record, RecordType};
use trust_dns_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

use crate::container::Lookup;
use crate::dns::soa::{dot_suffix, Soa};
use crate::dns::Resolver;
use crate::error::Error;
use crate::record::{self, RType, APEX, WILDCARD};

/// Serial used in SOA answers when no zone was found to supply one.
const DEFAULT_SERIAL: u32 = 1;

/// Handles one DNS message at a time against a [`Resolver`].
#[derive(Clone)]
pub struct Handler {
    resolver: Arc<dyn Resolver>,
    soa: Soa,
}

/// A synthesized reply, before wire framing.
#[derive(Debug)]
pub(crate) struct Reply {
    pub(crate) code: ResponseCode,
    pub(crate) authoritative: bool,
    pub(crate) answers: Vec<Record>,
    pub(crate) authority: Vec<Record>,
}

impl Handler {
    /// The `soa` is expected to be initialized (validated, defaults
    /// filled) by [`serve`][crate::dns::serve].
    pub(crate) fn new(resolver: Arc<dyn Resolver>, soa: Soa) -> Self {
        Handler { resolver, soa }
    }

    async fn dispatch<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> Result<ResponseInfo, Error> {
        if request.op_code() != OpCode::Query || request.message_type() != MessageType::Query {
            return self
                .send_error(request, response_handle, ResponseCode::NotImp)
                .await;
        }

        if request.header().query_count() != 1 {
            return self
                .send_error(request, response_handle, ResponseCode::NotImp)
                .await;
        }

        if request.query().query_class() != DNSClass::IN {
            return self
                .send_error(request, response_handle, ResponseCode::NotImp)
                .await;
        }

        let qname = request.query().name().to_string();
        let qtype = request.query().query_type();
        debug!(%qname, ?qtype, src = %request.src(), "query");

        let reply = self.lookup(&qname, qtype).await?;
        if reply.code != ResponseCode::NoError {
            debug!(%qname, code = ?reply.code, "negative reply");
        }

        self.send_reply(request, response_handle, &reply).await
    }

    async fn send_error<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
        code: ResponseCode,
    ) -> Result<ResponseInfo, Error> {
        let response = MessageResponseBuilder::from_message_request(request);
        Ok(response_handle
            .send_response(response.error_msg(request.header(), code))
            .await?)
    }

    async fn send_reply<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
        reply: &Reply,
    ) -> Result<ResponseInfo, Error> {
        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(reply.authoritative);
        header.set_response_code(reply.code);

        let builder = MessageResponseBuilder::from_message_request(request);
        let response = builder.build(
            header,
            reply.answers.iter(),
            &[],
            reply.authority.iter(),
            &[],
        );
        Ok(response_handle.send_response(response).await?)
    }

    /// Synthesize the reply for one question.
    pub(crate) async fn lookup(&self, qname: &str, qtype: RecordType) -> Result<Reply, Error> {
        let qname = dot_suffix(&qname.to_ascii_lowercase());
        let transfer = transfer_req(qtype);

        let mut nodes = Vec::new();
        let mut serial = 0;
        let mut found = false;
        let mut has_apex = false;

        if transfer {
            if self.soa.authority() {
                let (transfer_nodes, transfer_serial) = self.resolver.transfer_zone(&qname).await;
                if transfer_serial != 0 {
                    nodes = transfer_nodes;
                    serial = transfer_serial;
                    found = true;
                    // The transfer is framed as if the apex were present,
                    // so SOA and NS go out even for a bare zone.
                    has_apex = true;
                }
            }
        } else {
            match self.resolver.resolve_resource(&qname).await {
                Lookup::Records {
                    node,
                    serial: zone_serial,
                } => {
                    has_apex = node.name == APEX;
                    nodes.push(node);
                    serial = zone_serial;
                    found = true;
                }
                Lookup::NameError {
                    serial: zone_serial,
                } => serial = zone_serial,
                Lookup::OutOfZone => {}
            }
        }

        let mut reply = Reply {
            code: ResponseCode::NXDomain,
            authoritative: self.soa.authority(),
            answers: Vec::new(),
            authority: Vec::new(),
        };

        if found {
            if has_apex && self.soa.authority() {
                if reply_type(qtype, RecordType::SOA) {
                    reply.answers.push(self.soa_answer(&qname, serial)?);
                }

                if reply_type(qtype, RecordType::NS) {
                    let rdata = RData::NS(Name::from_ascii(&self.soa.ns)?);
                    reply.answers.push(Record::from_rdata(
                        Name::from_ascii(&qname)?,
                        self.soa.ttl,
                        rdata,
                    ));
                }
            }

            for node in &nodes {
                let owner = Name::from_ascii(owner_name(&node.name, &qname, has_apex))?;
                for rec in &node.records {
                    if reply_type(qtype, record_type(rec.rtype())) {
                        if let Some(rdata) = rdata(rec)? {
                            reply
                                .answers
                                .push(Record::from_rdata(owner.clone(), rec.ttl(), rdata));
                        }
                    }
                }
            }

            if transfer {
                // The zone transfer is concluded with a repeated SOA record.
                reply.answers.push(self.soa_answer(&qname, serial)?);
            }

            reply.code = ResponseCode::NoError;
        }

        // RFC 2308, Section 3: SOA in the authority section for negative
        // answers.
        if (reply.code == ResponseCode::NXDomain || reply.answers.is_empty())
            && self.soa.authority()
        {
            reply.authority.push(self.soa_answer(&qname, serial)?);
        }

        Ok(reply)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn soa_answer(&self, qname: &str, serial: u32) -> Result<Record, Error> {
        let serial = if serial == 0 { DEFAULT_SERIAL } else { serial };
        let rdata = RData::SOA(SOA::new(
            Name::from_ascii(&self.soa.ns)?,
            Name::from_ascii(&self.soa.mbox)?,
            serial,
            self.soa.refresh as i32,
            self.soa.retry as i32,
            self.soa.expire as i32,
            self.soa.min_ttl,
        ));
        Ok(Record::from_rdata(
            Name::from_ascii(qname)?,
            self.soa.ttl,
            rdata,
        ))
    }
}

#[async_trait]
impl RequestHandler for Handler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        match AssertUnwindSafe(self.dispatch(request, response_handle.clone()))
            .catch_unwind()
            .await
        {
            Ok(Ok(info)) => info,
            Ok(Err(err)) => {
                error!("error in request handler: {err:?}");
                send_servfail(request, &mut response_handle).await
            }
            Err(panic) => {
                error!("panic in request handler: {panic:?}");
                send_servfail(request, &mut response_handle).await
            }
        }
    }
}

/// The client always gets an answer: errors and caught panics still write a
/// SERVFAIL message before the handler returns.
async fn send_servfail<R: ResponseHandler>(
    request: &Request,
    response_handle: &mut R,
) -> ResponseInfo {
    let response = MessageResponseBuilder::from_message_request(request);
    match response_handle
        .send_response(response.error_msg(request.header(), ResponseCode::ServFail))
        .await
    {
        Ok(info) => info,
        Err(err) => {
            error!("failed to send SERVFAIL: {err}");
            let mut header = Header::new();
            header.set_response_code(ResponseCode::ServFail);
            header.into()
        }
    }
}

/// Owner name for a node's records in a reply to `qname`. Wildcard owners
/// follow RFC 4592 substitution; concrete nodes from a zone transfer are
/// qualified with the zone name.
fn owner_name(node: &str, qname: &str, has_apex: bool) -> String {
    if node == APEX {
        qname.to_string()
    } else if node == WILDCARD {
        format!("*.{qname}")
    } else if has_apex {
        format!("{node}.{qname}")
    } else {
        qname.to_string()
    }
}

/// True if records of `rtype` belong in the reply to a question of `qtype`.
fn reply_type(qtype: RecordType, rtype: RecordType) -> bool {
    matches!(
        qtype,
        RecordType::AXFR | RecordType::IXFR | RecordType::ANY
    ) || qtype == rtype
}

/// True if the question is some kind of zone transfer request.
fn transfer_req(qtype: RecordType) -> bool {
    matches!(qtype, RecordType::AXFR | RecordType::IXFR)
}

fn record_type(rtype: RType) -> RecordType {
    match rtype {
        RType::A => RecordType::A,
        RType::Ns => RecordType::NS,
        RType::Txt => RecordType::TXT,
        RType::Aaaa => RecordType::AAAA,
    }
}

/// Wire rdata for a zone record. Empty records produce nothing.
fn rdata(rec: &record::Record) -> Result<Option<RData>, Error> {
    Ok(match rec {
        record::Record::A {
            addr: Some(addr), ..
        } => Some(RData::A(*addr)),
        record::Record::Aaaa {
            addr: Some(addr), ..
        } => Some(RData::AAAA(*addr)),
        record::Record::Ns { host, .. } if !host.is_empty() => {
            Some(RData::NS(Name::from_ascii(host)?))
        }
        record::Record::Txt { values, .. } if !values.is_empty() => {
            Some(RData::TXT(TXT::new(values.clone())))
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::record::Record as ZoneRecord;
    use crate::zone::Zone;

    fn authority_soa() -> Soa {
        let mut soa = Soa {
            ns: "ns.example.net.".to_string(),
            mbox: "hostmaster.example.net.".to_string(),
            ..Soa::default()
        };
        soa.init().unwrap();
        soa
    }

    fn org_zone() -> Zone {
        let mut zone = Zone::new("example.org.");
        zone.insert(APEX, ZoneRecord::a("93.184.216.34".parse().unwrap(), 1));
        zone.insert("www", ZoneRecord::a("93.184.216.34".parse().unwrap(), 60));
        zone.insert(WILDCARD, ZoneRecord::txt(vec!["hi".to_string()], 5));
        zone
    }

    fn handler(zones: Vec<Zone>, soa: Soa) -> Handler {
        Handler::new(Arc::new(Container::with_serial(2000, zones)), soa)
    }

    fn answer_types(reply: &Reply) -> Vec<RecordType> {
        reply.answers.iter().map(Record::rr_type).collect()
    }

    #[tokio::test]
    async fn apex_a_query() {
        let handler = handler(vec![org_zone()], authority_soa());
        let reply = handler.lookup("example.org.", RecordType::A).await.unwrap();

        assert_eq!(reply.code, ResponseCode::NoError);
        assert!(reply.authoritative);
        assert_eq!(answer_types(&reply), vec![RecordType::A]);
        match reply.answers[0].data() {
            Some(RData::A(addr)) => assert_eq!(addr.to_string(), "93.184.216.34"),
            other => panic!("unexpected rdata: {other:?}"),
        }
        assert_eq!(
            reply.answers[0].name(),
            &Name::from_ascii("example.org.").unwrap()
        );
        assert!(reply.authority.is_empty());
    }

    #[tokio::test]
    async fn queries_are_case_insensitive() {
        let handler = handler(vec![org_zone()], authority_soa());
        let upper = handler.lookup("Example.ORG.", RecordType::A).await.unwrap();
        let lower = handler.lookup("example.org.", RecordType::A).await.unwrap();
        assert_eq!(upper.code, lower.code);
        assert_eq!(upper.answers, lower.answers);
    }

    #[tokio::test]
    async fn unknown_node_is_nxdomain_with_soa() {
        let mut zone = Zone::new("example.org.");
        zone.insert(APEX, ZoneRecord::a("93.184.216.34".parse().unwrap(), 1));
        let handler = handler(vec![zone], authority_soa());

        let reply = handler
            .lookup("foo.example.org.", RecordType::A)
            .await
            .unwrap();
        assert_eq!(reply.code, ResponseCode::NXDomain);
        assert!(reply.answers.is_empty());
        assert_eq!(reply.authority.len(), 1);
        match reply.authority[0].data() {
            Some(RData::SOA(soa)) => assert_eq!(soa.serial(), 2000),
            other => panic!("unexpected rdata: {other:?}"),
        }
    }

    #[tokio::test]
    async fn out_of_zone_soa_serial_defaults_to_one() {
        let handler = handler(vec![org_zone()], authority_soa());
        let reply = handler
            .lookup("www.example.net.", RecordType::A)
            .await
            .unwrap();
        assert_eq!(reply.code, ResponseCode::NXDomain);
        match reply.authority[0].data() {
            Some(RData::SOA(soa)) => assert_eq!(soa.serial(), 1),
            other => panic!("unexpected rdata: {other:?}"),
        }
    }

    #[tokio::test]
    async fn wildcard_answer_keeps_query_owner() {
        let handler = handler(vec![org_zone()], authority_soa());
        let reply = handler
            .lookup("anything.example.org.", RecordType::TXT)
            .await
            .unwrap();

        assert_eq!(reply.code, ResponseCode::NoError);
        assert_eq!(answer_types(&reply), vec![RecordType::TXT]);
        assert_eq!(
            reply.answers[0].name(),
            &Name::from_ascii("anything.example.org.").unwrap()
        );
        match reply.answers[0].data() {
            Some(RData::TXT(txt)) => assert_eq!(txt.txt_data()[0].as_ref(), b"hi"),
            other => panic!("unexpected rdata: {other:?}"),
        }
    }

    #[tokio::test]
    async fn nodata_answer_carries_soa_authority() {
        let handler = handler(vec![org_zone()], authority_soa());
        let reply = handler
            .lookup("www.example.org.", RecordType::TXT)
            .await
            .unwrap();

        // www resolves (so not NXDOMAIN) but serves no TXT record.
        assert_eq!(reply.code, ResponseCode::NoError);
        assert!(reply.answers.is_empty());
        assert_eq!(reply.authority.len(), 1);
    }

    #[tokio::test]
    async fn apex_soa_and_ns_queries() {
        let handler = handler(vec![org_zone()], authority_soa());

        let reply = handler
            .lookup("example.org.", RecordType::SOA)
            .await
            .unwrap();
        assert_eq!(answer_types(&reply), vec![RecordType::SOA]);

        let reply = handler.lookup("example.org.", RecordType::NS).await.unwrap();
        assert_eq!(answer_types(&reply), vec![RecordType::NS]);
        match reply.answers[0].data() {
            Some(RData::NS(ns)) => {
                assert_eq!(ns, &Name::from_ascii("ns.example.net.").unwrap());
            }
            other => panic!("unexpected rdata: {other:?}"),
        }
    }

    #[tokio::test]
    async fn any_query_returns_everything_at_apex() {
        let handler = handler(vec![org_zone()], authority_soa());
        let reply = handler
            .lookup("example.org.", RecordType::ANY)
            .await
            .unwrap();
        let types = answer_types(&reply);
        assert_eq!(
            types,
            vec![RecordType::SOA, RecordType::NS, RecordType::A]
        );
    }

    #[tokio::test]
    async fn axfr_framing() {
        let handler = handler(vec![org_zone()], authority_soa());
        let reply = handler
            .lookup("example.org.", RecordType::AXFR)
            .await
            .unwrap();

        assert_eq!(reply.code, ResponseCode::NoError);
        assert!(reply.authoritative);

        // SOA, NS, apex A, www A, wildcard TXT, closing SOA.
        let types = answer_types(&reply);
        assert_eq!(types.len(), 6);
        assert_eq!(types.first(), Some(&RecordType::SOA));
        assert_eq!(types.last(), Some(&RecordType::SOA));
        assert_eq!(types[1], RecordType::NS);

        let owners: Vec<String> = reply.answers.iter().map(|r| r.name().to_string()).collect();
        assert_eq!(owners[2], "example.org.");
        assert_eq!(owners[3], "www.example.org.");
        assert_eq!(owners[4], "*.example.org.");
        assert!(reply.authority.is_empty());
    }

    #[tokio::test]
    async fn ixfr_is_answered_like_axfr() {
        let handler = handler(vec![org_zone()], authority_soa());
        let axfr = handler
            .lookup("example.org.", RecordType::AXFR)
            .await
            .unwrap();
        let ixfr = handler
            .lookup("example.org.", RecordType::IXFR)
            .await
            .unwrap();
        assert_eq!(axfr.answers, ixfr.answers);
    }

    #[tokio::test]
    async fn axfr_of_unknown_zone_is_nxdomain() {
        let handler = handler(vec![org_zone()], authority_soa());
        let reply = handler
            .lookup("example.net.", RecordType::AXFR)
            .await
            .unwrap();
        assert_eq!(reply.code, ResponseCode::NXDomain);
        assert_eq!(reply.authority.len(), 1);
    }

    #[tokio::test]
    async fn axfr_of_bare_zone_still_frames_soa() {
        let handler = handler(vec![Zone::new("example.org.")], authority_soa());
        let reply = handler
            .lookup("example.org.", RecordType::AXFR)
            .await
            .unwrap();
        assert_eq!(reply.code, ResponseCode::NoError);
        let types = answer_types(&reply);
        assert_eq!(types.first(), Some(&RecordType::SOA));
        assert_eq!(types.last(), Some(&RecordType::SOA));
    }

    #[tokio::test]
    async fn no_authority_no_transfers_no_soa() {
        let handler = handler(vec![org_zone()], Soa::default());

        let reply = handler.lookup("example.org.", RecordType::A).await.unwrap();
        assert_eq!(reply.code, ResponseCode::NoError);
        assert!(!reply.authoritative);
        assert_eq!(answer_types(&reply), vec![RecordType::A]);

        let reply = handler
            .lookup("example.org.", RecordType::AXFR)
            .await
            .unwrap();
        assert_eq!(reply.code, ResponseCode::NXDomain);
        assert!(reply.authority.is_empty());

        let reply = handler
            .lookup("foo.example.org.", RecordType::A)
            .await
            .unwrap();
        assert_eq!(reply.code, ResponseCode::NXDomain);
        assert!(reply.authority.is_empty());
    }

    #[test]
    fn qtype_filter() {
        assert!(reply_type(RecordType::A, RecordType::A));
        assert!(!reply_type(RecordType::A, RecordType::TXT));
        for qtype in [RecordType::AXFR, RecordType::IXFR, RecordType::ANY] {
            assert!(reply_type(qtype, RecordType::TXT));
            assert!(reply_type(qtype, RecordType::SOA));
        }
    }
}
