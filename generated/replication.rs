/// Position 0/0 means "empty log" wherever an (epoch, sequence) pair is sent.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoLogEntry {
    #[prost(uint64, tag = "1")]
    pub epoch: u64,
    #[prost(uint64, tag = "2")]
    pub sequence: u64,
    /// Fully serialized log entry, including epoch and sequence.
    #[prost(bytes = "vec", tag = "3")]
    pub data: ::prost::alloc::vec::Vec<u8>,
}
// -- Heartbeat --

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoHeartbeatReq {
    #[prost(string, tag = "1")]
    pub primary_id: ::prost::alloc::string::String,
    #[prost(uint64, tag = "2")]
    pub epoch: u64,
    #[prost(uint64, tag = "3")]
    pub commit_sequence: u64,
    #[prost(uint64, tag = "4")]
    pub latest_epoch: u64,
    #[prost(uint64, tag = "5")]
    pub latest_sequence: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoHeartbeatResult {
    #[prost(oneof = "proto_heartbeat_result::Result", tags = "1, 2")]
    pub result: ::core::option::Option<proto_heartbeat_result::Result>,
}
/// Nested message and enum types in `ProtoHeartbeatResult`.
pub mod proto_heartbeat_result {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "1")]
        Ok(super::ProtoHeartbeatSuccess),
        #[prost(message, tag = "2")]
        Err(super::ProtoReplicationError),
    }
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoHeartbeatSuccess {
    #[prost(uint64, tag = "1")]
    pub latest_epoch: u64,
    #[prost(uint64, tag = "2")]
    pub latest_sequence: u64,
}
// -- AppendEntries --

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoAppendEntriesReq {
    #[prost(string, tag = "1")]
    pub primary_id: ::prost::alloc::string::String,
    #[prost(uint64, tag = "2")]
    pub epoch: u64,
    #[prost(uint64, tag = "3")]
    pub previous_epoch: u64,
    #[prost(uint64, tag = "4")]
    pub previous_sequence: u64,
    #[prost(uint64, tag = "5")]
    pub commit_sequence: u64,
    #[prost(message, repeated, tag = "6")]
    pub entries: ::prost::alloc::vec::Vec<ProtoLogEntry>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoAppendEntriesResult {
    #[prost(oneof = "proto_append_entries_result::Result", tags = "1, 2")]
    pub result: ::core::option::Option<proto_append_entries_result::Result>,
}
/// Nested message and enum types in `ProtoAppendEntriesResult`.
pub mod proto_append_entries_result {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "1")]
        Ok(super::ProtoAck),
        #[prost(message, tag = "2")]
        Err(super::ProtoReplicationError),
    }
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoAck {
    #[prost(uint64, tag = "1")]
    pub latest_epoch: u64,
    #[prost(uint64, tag = "2")]
    pub latest_sequence: u64,
}
// -- RequestVote --

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoRequestVoteReq {
    #[prost(string, tag = "1")]
    pub candidate_id: ::prost::alloc::string::String,
    #[prost(uint64, tag = "2")]
    pub epoch: u64,
    #[prost(uint64, tag = "3")]
    pub last_epoch: u64,
    #[prost(uint64, tag = "4")]
    pub last_sequence: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoRequestVoteResult {
    #[prost(oneof = "proto_request_vote_result::Result", tags = "1, 2")]
    pub result: ::core::option::Option<proto_request_vote_result::Result>,
}
/// Nested message and enum types in `ProtoRequestVoteResult`.
pub mod proto_request_vote_result {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "1")]
        Ok(super::ProtoRequestVoteSuccess),
        #[prost(message, tag = "2")]
        Err(super::ProtoReplicationError),
    }
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoRequestVoteSuccess {
    #[prost(bool, tag = "1")]
    pub vote_granted: bool,
    #[prost(uint64, tag = "2")]
    pub epoch: u64,
}
// -- RequestSync --

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoRequestSyncReq {
    #[prost(string, tag = "1")]
    pub primary_id: ::prost::alloc::string::String,
    #[prost(uint64, tag = "2")]
    pub epoch: u64,
    #[prost(uint64, tag = "3")]
    pub from_sequence: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoRequestSyncResult {
    #[prost(oneof = "proto_request_sync_result::Result", tags = "1, 2")]
    pub result: ::core::option::Option<proto_request_sync_result::Result>,
}
/// Nested message and enum types in `ProtoRequestSyncResult`.
pub mod proto_request_sync_result {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "1")]
        Ok(super::ProtoSyncData),
        #[prost(message, tag = "2")]
        Err(super::ProtoReplicationError),
    }
}
/// sync_data
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoSyncData {
    #[prost(uint64, tag = "1")]
    pub latest_epoch: u64,
    #[prost(uint64, tag = "2")]
    pub latest_sequence: u64,
    #[prost(message, repeated, tag = "3")]
    pub entries: ::prost::alloc::vec::Vec<ProtoLogEntry>,
}
// -- Errors --

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoReplicationError {
    #[prost(oneof = "proto_replication_error::Err", tags = "1, 2, 3, 4, 5")]
    pub err: ::core::option::Option<proto_replication_error::Err>,
}
/// Nested message and enum types in `ProtoReplicationError`.
pub mod proto_replication_error {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Err {
        #[prost(message, tag = "1")]
        ServerFault(super::ProtoServerFault),
        #[prost(message, tag = "2")]
        StaleEpoch(super::ProtoStaleEpoch),
        #[prost(message, tag = "3")]
        MissingPrevious(super::ProtoMissingPrevious),
        #[prost(message, tag = "4")]
        Conflict(super::ProtoConflict),
        #[prost(message, tag = "5")]
        NotInCluster(super::ProtoNotInCluster),
    }
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoServerFault {
    #[prost(string, tag = "1")]
    pub message: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoStaleEpoch {
    #[prost(uint64, tag = "1")]
    pub current_epoch: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoMissingPrevious {
    #[prost(uint64, tag = "1")]
    pub latest_sequence: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoConflict {
    #[prost(uint64, tag = "1")]
    pub sequence: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoNotInCluster {}
#[doc = r" Generated client implementations."]
pub mod grpc_replication_client {
    #![allow(unused_variables, dead_code, missing_docs)]
    use tonic::codegen::*;
    #[doc = " Replication channel between chat servers. Client traffic never uses this service."]
    pub struct GrpcReplicationClient<T> {
        inner: tonic::client::Grpc<T>,
    }
    impl GrpcReplicationClient<tonic::transport::Channel> {
        #[doc = r" Attempt to create a new client by connecting to a given endpoint."]
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: std::convert::TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }
    impl<T> GrpcReplicationClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::ResponseBody: Body + HttpBody + Send + 'static,
        T::Error: Into<StdError>,
        <T::ResponseBody as HttpBody>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }
        pub fn with_interceptor(inner: T, interceptor: impl Into<tonic::Interceptor>) -> Self {
            let inner = tonic::client::Grpc::with_interceptor(inner, interceptor);
            Self { inner }
        }
        #[doc = " Liveness + commit progress from the primary. Also the only traffic a primary sends while it"]
        #[doc = " is still running its post-election sync phase."]
        pub async fn heartbeat(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoHeartbeatReq>,
        ) -> Result<tonic::Response<super::ProtoHeartbeatResult>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/replication.GrpcReplication/Heartbeat");
            self.inner.unary(request.into_request(), path, codec).await
        }
        #[doc = " append_entry: ship log entries to a backup, replied to with an ack."]
        pub async fn append_entries(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoAppendEntriesReq>,
        ) -> Result<tonic::Response<super::ProtoAppendEntriesResult>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/replication.GrpcReplication/AppendEntries");
            self.inner.unary(request.into_request(), path, codec).await
        }
        #[doc = " claim_primary: a candidate asking for a vote."]
        pub async fn request_vote(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoRequestVoteReq>,
        ) -> Result<tonic::Response<super::ProtoRequestVoteResult>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/replication.GrpcReplication/RequestVote");
            self.inner.unary(request.into_request(), path, codec).await
        }
        #[doc = " request_sync: a freshly elected primary pulling whatever a peer has past its commit point."]
        pub async fn request_sync(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoRequestSyncReq>,
        ) -> Result<tonic::Response<super::ProtoRequestSyncResult>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/replication.GrpcReplication/RequestSync");
            self.inner.unary(request.into_request(), path, codec).await
        }
    }
    impl<T: Clone> Clone for GrpcReplicationClient<T> {
        fn clone(&self) -> Self {
            Self {
                inner: self.inner.clone(),
            }
        }
    }
    impl<T> std::fmt::Debug for GrpcReplicationClient<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "GrpcReplicationClient {{ ... }}")
        }
    }
}
#[doc = r" Generated server implementations."]
pub mod grpc_replication_server {
    #![allow(unused_variables, dead_code, missing_docs)]
    use tonic::codegen::*;
    #[doc = "Generated trait containing gRPC methods that should be implemented for use with GrpcReplicationServer."]
    #[async_trait]
    pub trait GrpcReplication: Send + Sync + 'static {
        #[doc = " Liveness + commit progress from the primary. Also the only traffic a primary sends while it"]
        #[doc = " is still running its post-election sync phase."]
        async fn heartbeat(
            &self,
            request: tonic::Request<super::ProtoHeartbeatReq>,
        ) -> Result<tonic::Response<super::ProtoHeartbeatResult>, tonic::Status>;
        #[doc = " append_entry: ship log entries to a backup, replied to with an ack."]
        async fn append_entries(
            &self,
            request: tonic::Request<super::ProtoAppendEntriesReq>,
        ) -> Result<tonic::Response<super::ProtoAppendEntriesResult>, tonic::Status>;
        #[doc = " claim_primary: a candidate asking for a vote."]
        async fn request_vote(
            &self,
            request: tonic::Request<super::ProtoRequestVoteReq>,
        ) -> Result<tonic::Response<super::ProtoRequestVoteResult>, tonic::Status>;
        #[doc = " request_sync: a freshly elected primary pulling whatever a peer has past its commit point."]
        async fn request_sync(
            &self,
            request: tonic::Request<super::ProtoRequestSyncReq>,
        ) -> Result<tonic::Response<super::ProtoRequestSyncResult>, tonic::Status>;
    }
    #[doc = " Replication channel between chat servers. Client traffic never uses this service."]
    #[derive(Debug)]
    pub struct GrpcReplicationServer<T: GrpcReplication> {
        inner: _Inner<T>,
    }
    struct _Inner<T>(Arc<T>, Option<tonic::Interceptor>);
    impl<T: GrpcReplication> GrpcReplicationServer<T> {
        pub fn new(inner: T) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner, None);
            Self { inner }
        }
        pub fn with_interceptor(inner: T, interceptor: impl Into<tonic::Interceptor>) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner, Some(interceptor.into()));
            Self { inner }
        }
    }
    impl<T, B> Service<http::Request<B>> for GrpcReplicationServer<T>
    where
        T: GrpcReplication,
        B: HttpBody + Send + Sync + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = Never;
        type Future = BoxFuture<Self::Response, Self::Error>;
        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            let inner = self.inner.clone();
            match req.uri().path() {
                "/replication.GrpcReplication/Heartbeat" => {
                    #[allow(non_camel_case_types)]
                    struct HeartbeatSvc<T: GrpcReplication>(pub Arc<T>);
                    impl<T: GrpcReplication> tonic::server::UnaryService<super::ProtoHeartbeatReq> for HeartbeatSvc<T> {
                        type Response = super::ProtoHeartbeatResult;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoHeartbeatReq>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).heartbeat(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = HeartbeatSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/replication.GrpcReplication/AppendEntries" => {
                    #[allow(non_camel_case_types)]
                    struct AppendEntriesSvc<T: GrpcReplication>(pub Arc<T>);
                    impl<T: GrpcReplication>
                        tonic::server::UnaryService<super::ProtoAppendEntriesReq>
                        for AppendEntriesSvc<T>
                    {
                        type Response = super::ProtoAppendEntriesResult;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoAppendEntriesReq>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).append_entries(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = AppendEntriesSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/replication.GrpcReplication/RequestVote" => {
                    #[allow(non_camel_case_types)]
                    struct RequestVoteSvc<T: GrpcReplication>(pub Arc<T>);
                    impl<T: GrpcReplication> tonic::server::UnaryService<super::ProtoRequestVoteReq>
                        for RequestVoteSvc<T>
                    {
                        type Response = super::ProtoRequestVoteResult;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoRequestVoteReq>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).request_vote(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = RequestVoteSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/replication.GrpcReplication/RequestSync" => {
                    #[allow(non_camel_case_types)]
                    struct RequestSyncSvc<T: GrpcReplication>(pub Arc<T>);
                    impl<T: GrpcReplication> tonic::server::UnaryService<super::ProtoRequestSyncReq>
                        for RequestSyncSvc<T>
                    {
                        type Response = super::ProtoRequestSyncResult;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoRequestSyncReq>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).request_sync(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = RequestSyncSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                _ => Box::pin(async move {
                    Ok(http::Response::builder()
                        .status(200)
                        .header("grpc-status", "12")
                        .header("content-type", "application/grpc")
                        .body(tonic::body::BoxBody::empty())
                        .unwrap())
                }),
            }
        }
    }
    impl<T: GrpcReplication> Clone for GrpcReplicationServer<T> {
        fn clone(&self) -> Self {
            let inner = self.inner.clone();
            Self { inner }
        }
    }
    impl<T: GrpcReplication> Clone for _Inner<T> {
        fn clone(&self) -> Self {
            Self(self.0.clone(), self.1.clone())
        }
    }
    impl<T: std::fmt::Debug> std::fmt::Debug for _Inner<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }
    impl<T: GrpcReplication> tonic::transport::NamedService for GrpcReplicationServer<T> {
        const NAME: &'static str = "replication.GrpcReplication";
    }
}
