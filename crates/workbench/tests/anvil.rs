//! Runs against a real anvil node and `solc`; enabled with `--features anvil-test`.
#![cfg(feature = "anvil-test")]

mod common;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alloy_dyn_abi::DynSolValue;

    use super::common::{
        addr_value,
        uint,
    };
    use tempfile::TempDir;
    use workbench::{
        MockOptions,
        Workbench,
        WorkbenchConfig,
        test_utils::init_test_tracing,
    };

    const COUNTER: &str = r#"// SPDX-License-Identifier: MIT
pragma solidity ^0.8.13;

contract Counter {
    uint256 public count;

    constructor(uint256 start) {
        count = start;
    }

    function bump(uint256 by) external returns (uint256) {
        count += by;
        return count;
    }

    function owner(address who) external pure returns (address) {
        return who;
    }
}

interface ICounter {
    function count() external view returns (uint256);
}

contract Reader {
    function read(address counter) external view returns (uint256) {
        return ICounter(counter).count();
    }
}
"#;

    async fn suite(port: u16) -> anyhow::Result<(TempDir, workbench::TestSuite)> {
        init_test_tracing();
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join("Counter.sol"), COUNTER)?;

        let config = WorkbenchConfig::default()
            .with_contracts_dir(dir.path())
            .with_env_path(dir.path().join("ethereum.json"))
            .with_port(port)
            .with_receipt_timing(Duration::from_millis(50), Duration::from_secs(20));
        let suite = Workbench::new(config)?.start_testing(&["Counter"]).await?;
        Ok((dir, suite))
    }

    #[tokio::test]
    async fn test_real_deployment_reads_and_writes() -> anyhow::Result<()> {
        let (_dir, suite) = suite(8561).await?;
        let counter = suite.contract("Counter")?.deploy(vec![uint(3)]).await?;

        assert_eq!(counter.call("count", &[]).await?, vec![uint(3)]);

        let tx_hash = counter
            .invoke("bump", &[uint(4)])
            .await?
            .tx_hash()
            .expect("bump is a transaction");
        let receipt = suite.harness().wait_for_receipt(tx_hash).await?;
        assert!(receipt.status);
        assert_eq!(counter.call("count", &[]).await?, vec![uint(7)]);

        suite.finish().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_proxy_mocks_and_traces_on_chain() -> anyhow::Result<()> {
        let (_dir, suite) = suite(8562).await?;
        let target = suite.contract("Counter")?.deploy(vec![uint(0)]).await?;
        let mock = suite
            .contract("Counter")?
            .new_mock(MockOptions::traced())
            .await?;

        let count = mock.function("count")?;
        count.mock_call_return_value(uint(11), None).await?;
        assert_eq!(count.call(&[]).await?, vec![uint(11)]);

        let owner = mock.function("owner")?;
        owner
            .mock_call_return_value(addr_value(0x22), Some(&[addr_value(0x01)]))
            .await?;
        assert_eq!(owner.call(&[addr_value(0x01)]).await?, vec![addr_value(0x22)]);

        let bump = mock.function("bump")?;
        bump.mock_transaction_forward(target.address(), workbench::ForwardCall::Passthrough, None)
            .await?;
        let tx_hash = bump.invoke(&[uint(5)]).await?.tx_hash().expect("bump is a transaction");
        let receipt = suite.harness().wait_for_receipt(tx_hash).await?;

        let record = bump.was_called(&receipt)?;
        assert!(record.called);
        assert_eq!(record.args, Some(vec![uint(5)]));
        assert_eq!(target.call("count", &[]).await?, vec![uint(5)]);

        suite.finish().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_view_function_reads_traced_mock() -> anyhow::Result<()> {
        let (_dir, suite) = suite(8563).await?;
        let reader = suite.contract("Reader")?.deploy(vec![]).await?;
        let mock = suite
            .contract("Counter")?
            .new_mock(MockOptions::traced())
            .await?;
        mock.function("count")?
            .mock_call_return_value(uint(11), None)
            .await?;

        // Reader.read is a view, so the mock is reached through STATICCALL.
        assert_eq!(
            reader.call("read", &[DynSolValue::Address(mock.address())]).await?,
            vec![uint(11)]
        );
        assert!(mock.tracing().await?);

        suite.finish().await?;
        Ok(())
    }
}
