fn main() {
    #[cfg(feature = "rpc-transport")]
    {
        tonic_build::configure()
            .build_client(true)
            .build_server(true)
            .compile(&["proto/hxhim.proto"], &["proto"])
            .expect("failed to compile proto/hxhim.proto");
    }
}
