use super::FluxGateway;
use super::handlers;
use silent::prelude::*;
use std::sync::Arc;

/// 构建所有路由
pub fn build_routes(gateway: Arc<FluxGateway>) -> Route {
    Route::new("")
        // 健康检查
        .append(Route::new("healthz").get(handlers::health_check))
        .append(Route::new("system/info").get({
            let gateway = gateway.clone();
            move |req| handlers::system_info(req, gateway.clone())
        }))
        // 函数管理
        .append(
            Route::new("system/functions")
                .get({
                    let gateway = gateway.clone();
                    move |req| handlers::list_functions(req, gateway.clone())
                })
                .post({
                    let gateway = gateway.clone();
                    move |req| handlers::deploy_function(req, gateway.clone())
                })
                .put({
                    let gateway = gateway.clone();
                    move |req| handlers::update_function(req, gateway.clone())
                })
                .delete({
                    let gateway = gateway.clone();
                    move |req| handlers::delete_function(req, gateway.clone())
                }),
        )
        // 副本
        .append(Route::new("system/function/<name>").get({
            let gateway = gateway.clone();
            move |req| handlers::replica_reader(req, gateway.clone())
        }))
        .append(Route::new("system/scale-function/<name>").post(handlers::replica_updater))
        // 日志
        .append(Route::new("system/logs").get({
            let gateway = gateway.clone();
            move |req| handlers::function_logs(req, gateway.clone())
        }))
        // 函数调用
        .append(
            Route::new("function/<name>")
                .get({
                    let gateway = gateway.clone();
                    move |req| handlers::invoke_function(req, gateway.clone())
                })
                .post({
                    let gateway = gateway.clone();
                    move |req| handlers::invoke_function(req, gateway.clone())
                })
                .put({
                    let gateway = gateway.clone();
                    move |req| handlers::invoke_function(req, gateway.clone())
                })
                .delete({
                    let gateway = gateway.clone();
                    move |req| handlers::invoke_function(req, gateway.clone())
                }),
        )
}
