mod common;

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::Duration,
    };

    use super::common::{
        addr_value,
        uint,
    };
    use alloy_primitives::Address;
    use tempfile::TempDir;
    use workbench::{
        MockOptions,
        Workbench,
        WorkbenchConfig,
        WorkbenchError,
        env::{
            AccountSpec,
            ChainEnvironment,
            DEFAULT_ACCOUNT,
            DEFAULT_BALANCE,
            default_environment,
            load_environment,
        },
        test_utils::{
            FixtureCompiler,
            MockChain,
            MockSandbox,
            init_test_tracing,
        },
    };

    fn config(dir: &TempDir) -> WorkbenchConfig {
        WorkbenchConfig::default()
            .with_env_path(dir.path().join("ethereum.json"))
            .with_contracts_dir(dir.path())
            .with_receipt_timing(Duration::from_millis(1), Duration::from_secs(2))
            .with_suite_timeout(Duration::from_millis(200))
    }

    fn workbench(dir: &TempDir, chain: MockChain) -> Workbench {
        workbench_with(config(dir).with_from(DEFAULT_ACCOUNT), chain)
    }

    fn workbench_with(config: WorkbenchConfig, chain: MockChain) -> Workbench {
        init_test_tracing();
        Workbench::with_backends(
            config,
            Arc::new(FixtureCompiler::sample()),
            Box::new(MockSandbox::new(chain)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_environment_file_is_created_on_construction() {
        let dir = TempDir::new().unwrap();
        let _workbench = workbench(&dir, MockChain::default());

        let snapshot = load_environment(&dir.path().join("ethereum.json")).unwrap();
        assert_eq!(snapshot.env.default_account(), Some(DEFAULT_ACCOUNT));
        assert_eq!(snapshot.contracts, "contracts");
    }

    #[tokio::test]
    async fn test_start_testing_compiles_and_boots() {
        let dir = TempDir::new().unwrap();
        let suite = workbench(&dir, MockChain::default())
            .start_testing(&["Token"])
            .await
            .unwrap();

        assert_eq!(suite.name(), "[Token.sol] Contracts Testing");
        assert_eq!(suite.timeout(), Duration::from_millis(200));

        let names: Vec<&str> = suite
            .workbench()
            .artifacts()
            .iter()
            .map(|artifact| artifact.name.as_str())
            .collect();
        assert_eq!(names, vec!["Token", "Proxy"]);
        assert_eq!(suite.harness().interfaces().len(), 2);

        suite.finish().await.unwrap();
    }

    #[tokio::test]
    async fn test_suite_contracts_can_be_mocked() {
        let dir = TempDir::new().unwrap();
        let suite = workbench(&dir, MockChain::default())
            .start_testing(&["Token"])
            .await
            .unwrap();

        let mock = suite
            .contract("Token")
            .unwrap()
            .new_mock(MockOptions::default())
            .await
            .unwrap();
        let balance_of = mock.function("balanceOf").unwrap();
        balance_of
            .mock_call_return_value(uint(9), None)
            .await
            .unwrap();

        let balance = suite
            .run(async { balance_of.call(&[addr_value(0x01)]).await })
            .await
            .unwrap();
        assert_eq!(balance, vec![uint(9)]);

        assert!(matches!(
            suite.contract("Vault"),
            Err(WorkbenchError::UnknownContract(name)) if name == "Vault"
        ));
    }

    #[tokio::test]
    async fn test_run_enforces_suite_timeout() {
        let dir = TempDir::new().unwrap();
        let suite = workbench(&dir, MockChain::default())
            .start_testing(&["Token"])
            .await
            .unwrap();

        let result = suite
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        match result {
            Err(WorkbenchError::SuiteTimeout { suite: name, timeout }) => {
                assert_eq!(name, "[Token.sol] Contracts Testing");
                assert_eq!(timeout, Duration::from_millis(200));
            }
            other => panic!("expected suite timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_source_fails_compilation() {
        let dir = TempDir::new().unwrap();
        let result = workbench(&dir, MockChain::default())
            .start_testing(&["Token", "Vault"])
            .await;

        assert!(matches!(result, Err(WorkbenchError::Compilation(_))));
    }

    #[tokio::test]
    async fn test_factory_requires_a_started_workbench() {
        let dir = TempDir::new().unwrap();
        let mut workbench = workbench(&dir, MockChain::default());
        workbench.compile(&["Token.sol".to_string()], dir.path()).await.unwrap();

        assert!(matches!(
            workbench.factory("Token"),
            Err(WorkbenchError::NotStarted)
        ));

        workbench.start().await.unwrap();
        assert!(workbench.factory("Token").is_ok());

        workbench.stop().await.unwrap();
        assert!(matches!(
            workbench.factory("Token"),
            Err(WorkbenchError::NotStarted)
        ));
    }

    fn environment(accounts: &[(Address, &str, bool)]) -> ChainEnvironment {
        let mut env = default_environment(None);
        env.accounts = accounts
            .iter()
            .map(|(address, name, default)| {
                let spec = AccountSpec {
                    name: name.to_string(),
                    balance: DEFAULT_BALANCE,
                    nonce: 0,
                    pkey: name.to_string(),
                    default: *default,
                };
                (*address, spec)
            })
            .collect();
        env
    }

    #[tokio::test]
    async fn test_sender_defaults_to_environment_account() {
        let dir = TempDir::new().unwrap();
        let sender = Address::repeat_byte(0x77);
        let config = config(&dir).with_initial_state(environment(&[
            (DEFAULT_ACCOUNT, "fellow-1", false),
            (sender, "fellow-2", true),
        ]));
        let chain = MockChain::default();
        let suite = workbench_with(config, chain.clone())
            .start_testing(&["Token"])
            .await
            .unwrap();
        assert_eq!(suite.harness().defaults().from, Some(sender));

        suite.contract("Token").unwrap().deploy(vec![]).await.unwrap();
        let deployment = chain.transactions().pop().unwrap();
        assert_eq!(deployment.from, Some(sender));
    }

    #[tokio::test]
    async fn test_sender_falls_back_to_node_accounts() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir).with_initial_state(environment(&[(
            Address::repeat_byte(0x77),
            "fellow-2",
            false,
        )]));
        let chain = MockChain::default();
        let suite = workbench_with(config, chain.clone())
            .start_testing(&["Token"])
            .await
            .unwrap();
        assert_eq!(suite.harness().defaults().from, Some(DEFAULT_ACCOUNT));

        suite.contract("Token").unwrap().deploy(vec![]).await.unwrap();
        assert_eq!(chain.transactions().pop().unwrap().from, Some(DEFAULT_ACCOUNT));
    }

    #[tokio::test]
    async fn test_sender_resolution_surfaces_rpc_failure() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir).with_initial_state(environment(&[]));
        let chain = MockChain::default();
        chain.set_rpc_failure(Some("connection refused".to_string()));
        let mut workbench = workbench_with(config, chain);

        assert!(matches!(
            workbench.start().await,
            Err(WorkbenchError::RpcError(_))
        ));
    }

    #[tokio::test]
    async fn test_sandbox_cannot_start_twice() {
        let dir = TempDir::new().unwrap();
        let mut workbench = workbench(&dir, MockChain::default());
        workbench.start().await.unwrap();

        assert!(matches!(
            workbench.start().await,
            Err(WorkbenchError::Sandbox(_))
        ));
    }
}
